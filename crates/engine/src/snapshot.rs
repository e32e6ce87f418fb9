//! Snapshot lifecycle: naming, creation, deletion, enumeration.
//!
//! Snapshot names follow `<source-basename>.<UTC-timestamp>` with an
//! RFC 3339 timestamp at second precision. The textual form preserves
//! chronological ordering, which is what lets the parent selector and the
//! retention pruner reason about age without trusting filesystem mtimes.

use std::path::Path;
use std::time::Duration;

use snapsend_core::{BackupError, BackupResult, CancelToken, ErrorKind};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::{debug, warn};

use crate::command::{ToolInvocation, cancellable_pause};

const SNAPSHOT_TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

const CREATE_DEADLINE: Duration = Duration::from_secs(120);
const DELETE_DEADLINE: Duration = Duration::from_secs(120);
const DELETE_ATTEMPTS: u32 = 3;
const DELETE_PAUSE: Duration = Duration::from_secs(1);

/// Builds the snapshot name for a run starting at `now`.
///
/// # Errors
///
/// [`ErrorKind::SnapshotOperationFailed`] when the timestamp cannot be
/// rendered, which only happens for degenerate dates far outside any
/// plausible clock.
pub fn mint_snapshot_name(basename: &str, now: OffsetDateTime) -> BackupResult<String> {
    let stamp = now
        .to_offset(UtcOffset::UTC)
        .format(SNAPSHOT_TIMESTAMP_FORMAT)
        .map_err(|error| {
            BackupError::new(
                ErrorKind::SnapshotOperationFailed,
                format!("cannot render snapshot timestamp: {error}"),
            )
            .with_source(error)
        })?;
    Ok(format!("{basename}.{stamp}"))
}

/// Extracts the embedded timestamp from a snapshot name with the given
/// basename prefix. Returns `None` for names this engine did not mint.
#[must_use]
pub fn parse_snapshot_timestamp(name: &str, basename: &str) -> Option<OffsetDateTime> {
    let stamp = name
        .strip_prefix(basename)
        .and_then(|rest| rest.strip_prefix('.'))?;
    PrimitiveDateTime::parse(stamp, SNAPSHOT_TIMESTAMP_FORMAT)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Creates a read-only snapshot of `source` at `snapshot_path`.
///
/// The snapshot directory is created first when missing; the snapshot
/// itself is atomic on the filesystem side.
///
/// # Errors
///
/// [`ErrorKind::SnapshotOperationFailed`] wrapping the runner's failure.
pub fn create_readonly_snapshot(
    source: &Path,
    snapshot_path: &Path,
    cancel: &CancelToken,
) -> BackupResult<()> {
    if let Some(parent) = snapshot_path.parent() {
        std::fs::create_dir_all(parent).map_err(|error| {
            BackupError::new(
                ErrorKind::SnapshotOperationFailed,
                format!("cannot create snapshot directory: {error}"),
            )
            .with_path(parent)
            .with_source(error)
        })?;
    }

    ToolInvocation::new("btrfs")
        .arg("subvolume")
        .arg("snapshot")
        .arg("-r")
        .path_arg(source)
        .path_arg(snapshot_path)
        .run(CREATE_DEADLINE, cancel)
        .map_err(|error| {
            BackupError::new(
                ErrorKind::SnapshotOperationFailed,
                format!("cannot snapshot {}", source.display()),
            )
            .with_path(snapshot_path)
            .with_source(error)
        })?;

    debug!(snapshot = %snapshot_path.display(), "created read-only snapshot");
    Ok(())
}

/// Deletes the subvolume at `path`, retrying up to three times.
///
/// The second and later attempts add `--commit-after`, which flushes the
/// deletion through a transaction commit and clears snapshots stuck in a
/// partial state.
///
/// # Errors
///
/// [`ErrorKind::SnapshotOperationFailed`] when the final attempt fails.
pub fn delete_snapshot(path: &Path, cancel: &CancelToken) -> BackupResult<()> {
    let mut last_error = None;
    for attempt in 1..=DELETE_ATTEMPTS {
        let mut invocation = ToolInvocation::new("btrfs").arg("subvolume").arg("delete");
        if attempt >= 2 {
            invocation = invocation.arg("--commit-after");
        }
        match invocation.path_arg(path).run(DELETE_DEADLINE, cancel) {
            Ok(_) => {
                debug!(snapshot = %path.display(), attempt, "deleted snapshot");
                return Ok(());
            }
            Err(error) => {
                warn!(snapshot = %path.display(), attempt, %error, "snapshot delete failed");
                last_error = Some(error);
            }
        }
        if attempt < DELETE_ATTEMPTS {
            cancellable_pause(DELETE_PAUSE, cancel, "snapshot delete")?;
        }
    }

    let mut error = BackupError::new(
        ErrorKind::SnapshotOperationFailed,
        format!(
            "cannot delete snapshot {} after {DELETE_ATTEMPTS} attempts",
            path.display()
        ),
    )
    .with_path(path);
    if let Some(cause) = last_error {
        error = error.with_source(cause);
    }
    Err(error)
}

/// Lists direct children of `dir` whose names begin with `<basename>.`.
///
/// A missing directory reads as empty: the destination may legitimately
/// hold no snapshots yet.
///
/// # Errors
///
/// [`ErrorKind::SnapshotOperationFailed`] for I/O failures other than the
/// directory being absent.
pub fn list_snapshots(dir: &Path, basename: &str) -> BackupResult<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => {
            return Err(BackupError::new(
                ErrorKind::SnapshotOperationFailed,
                format!("cannot enumerate snapshots: {error}"),
            )
            .with_path(dir)
            .with_source(error));
        }
    };

    let prefix = format!("{basename}.");
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|error| {
            BackupError::new(
                ErrorKind::SnapshotOperationFailed,
                format!("cannot enumerate snapshots: {error}"),
            )
            .with_path(dir)
            .with_source(error)
        })?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str()
            && name.starts_with(&prefix)
        {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests;
