//! Queries against `btrfs subvolume show` output.
//!
//! A subvolume's own UUID and the received UUID recorded by `btrfs receive`
//! are different 36-character values, and confusing them would make every
//! post-transfer verification compare a value with itself. They are kept as
//! distinct newtypes so the compiler refuses the mix-up.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use snapsend_core::{BackupError, BackupResult, CancelToken, ErrorKind};

use crate::command::ToolInvocation;

const SHOW_DEADLINE: Duration = Duration::from_secs(60);

/// A subvolume's own UUID, assigned by the filesystem at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubvolumeUuid(String);

/// The sending snapshot's UUID as recorded on a received snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceivedUuid(String);

impl SubvolumeUuid {
    /// Validates and wraps a textual UUID.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::InvalidInput`] when the value is not a 36-character
    /// hex-with-dashes UUID.
    pub fn parse(text: &str) -> BackupResult<Self> {
        check_uuid_shape(text)?;
        Ok(Self(text.to_string()))
    }

    /// The textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ReceivedUuid {
    /// Validates and wraps a textual UUID.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::InvalidInput`] when the value is not a 36-character
    /// hex-with-dashes UUID.
    pub fn parse(text: &str) -> BackupResult<Self> {
        check_uuid_shape(text)?;
        Ok(Self(text.to_string()))
    }

    /// The textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this received UUID records the given source UUID.
    ///
    /// This is the one place the two identifier kinds are allowed to meet.
    #[must_use]
    pub fn confirms(&self, source: &SubvolumeUuid) -> bool {
        self.0 == source.0
    }
}

impl fmt::Display for SubvolumeUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ReceivedUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fields this engine needs from `btrfs subvolume show`.
#[derive(Debug, Clone)]
pub struct SubvolumeInfo {
    /// The subvolume's own UUID.
    pub uuid: SubvolumeUuid,
    /// The received UUID, present only on snapshots created by receive.
    pub received_uuid: Option<ReceivedUuid>,
    /// Total referenced bytes, when the tool reports them.
    pub total_bytes: Option<u64>,
}

/// Runs `btrfs subvolume show` and extracts the fields of interest.
///
/// # Errors
///
/// Command failures from the runner, and
/// [`ErrorKind::SnapshotOperationFailed`] when the output carries no UUID.
pub fn show_subvolume(path: &Path, cancel: &CancelToken) -> BackupResult<SubvolumeInfo> {
    let output = ToolInvocation::new("btrfs")
        .arg("subvolume")
        .arg("show")
        .path_arg(path)
        .run(SHOW_DEADLINE, cancel)?;
    parse_show_output(&output.stdout_text()).map_err(|error| error.with_path(path))
}

/// Parses show output using field-anchored patterns: a known key, a colon,
/// then the value up to end of line.
///
/// The own UUID is the first line whose key is exactly `UUID`; `Parent
/// UUID` and `Received UUID` lines have their own keys and never match it.
pub(crate) fn parse_show_output(text: &str) -> BackupResult<SubvolumeInfo> {
    let mut uuid = None;
    let mut received_uuid = None;
    let mut total_bytes = None;

    for line in text.lines() {
        if let Some(value) = field_value(line, "Received UUID") {
            if received_uuid.is_none() && value != "-" {
                received_uuid = Some(ReceivedUuid::parse(value)?);
            }
        } else if let Some(value) = field_value(line, "Total bytes") {
            if total_bytes.is_none() {
                total_bytes = value.parse().ok();
            }
        } else if let Some(value) = field_value(line, "UUID")
            && uuid.is_none()
        {
            uuid = Some(SubvolumeUuid::parse(value)?);
        }
    }

    let uuid = uuid.ok_or_else(|| {
        BackupError::new(
            ErrorKind::SnapshotOperationFailed,
            "subvolume show output carries no UUID",
        )
    })?;

    Ok(SubvolumeInfo {
        uuid,
        received_uuid,
        total_bytes,
    })
}

/// Extracts the value of `<key>:` from a line, anchored at the key.
fn field_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.trim_start().strip_prefix(key)?;
    let value = rest.trim_start().strip_prefix(':')?;
    Some(value.trim())
}

fn check_uuid_shape(text: &str) -> BackupResult<()> {
    let dashes_at = [8, 13, 18, 23];
    let well_formed = text.len() == 36
        && text.char_indices().all(|(index, c)| {
            if dashes_at.contains(&index) {
                c == '-'
            } else {
                c.is_ascii_hexdigit()
            }
        });
    if well_formed {
        Ok(())
    } else {
        Err(BackupError::new(
            ErrorKind::InvalidInput,
            format!("'{text}' is not a well-formed subvolume UUID"),
        ))
    }
}

#[cfg(test)]
mod tests;
