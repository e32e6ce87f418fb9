//! Destination free-space checking.
//!
//! `btrfs filesystem usage -b` is the only reliable free-space source for
//! btrfs; `statvfs` numbers lie under mixed data/metadata profiles. The
//! check is retried because the usage scan can fail transiently while the
//! filesystem is busy committing.

use std::path::Path;
use std::time::Duration;

use snapsend_core::size::format_bytes;
use snapsend_core::{BackupError, BackupResult, CancelToken, ErrorKind};
use tracing::{debug, warn};

use crate::command::{ToolInvocation, cancellable_pause};

const SPACE_CHECK_ATTEMPTS: u32 = 3;
const SPACE_CHECK_PAUSE: Duration = Duration::from_secs(3);
const SPACE_CHECK_DEADLINE: Duration = Duration::from_secs(120);

/// Verifies the destination can hold `required` bytes plus the safety
/// buffer; returns the available byte count on success.
///
/// # Errors
///
/// - [`ErrorKind::InsufficientSpace`] with both numbers when the
///   destination falls short.
/// - [`ErrorKind::CommandFailed`] when the usage output stays unusable
///   across all attempts.
pub fn ensure_space(
    dest_mount: &Path,
    required: u64,
    buffer: u64,
    cancel: &CancelToken,
) -> BackupResult<u64> {
    let mut last_error = None;
    for attempt in 1..=SPACE_CHECK_ATTEMPTS {
        match query_free_bytes(dest_mount, cancel) {
            Ok(available) => {
                let needed = required.saturating_add(buffer);
                debug!(available, needed, "destination space check");
                if available < needed {
                    return Err(BackupError::new(
                        ErrorKind::InsufficientSpace,
                        format!(
                            "destination has {} free but the transfer needs {} ({} estimated + {} buffer)",
                            format_bytes(available),
                            format_bytes(needed),
                            format_bytes(required),
                            format_bytes(buffer),
                        ),
                    )
                    .with_path(dest_mount)
                    .with_suggestion("prune old snapshots on the destination or lower min_free_gb"));
                }
                return Ok(available);
            }
            // Only a busy filesystem is worth retrying; missing tools,
            // rejected arguments, and cancellation are not transient.
            Err(error)
                if matches!(
                    error.kind(),
                    ErrorKind::Timeout | ErrorKind::DependencyMissing | ErrorKind::InvalidInput
                ) =>
            {
                return Err(error);
            }
            Err(error) => {
                warn!(attempt, %error, "free-space query failed");
                last_error = Some(error);
            }
        }
        if attempt < SPACE_CHECK_ATTEMPTS {
            cancellable_pause(SPACE_CHECK_PAUSE, cancel, "space check")?;
        }
    }

    Err(last_error.unwrap_or_else(|| {
        BackupError::new(ErrorKind::CommandFailed, "free-space query produced no result")
            .with_path(dest_mount)
    }))
}

fn query_free_bytes(dest_mount: &Path, cancel: &CancelToken) -> BackupResult<u64> {
    let output = ToolInvocation::new("btrfs")
        .arg("filesystem")
        .arg("usage")
        .arg("-b")
        .path_arg(dest_mount)
        .run(SPACE_CHECK_DEADLINE, cancel)?;

    parse_free_estimated(&output.stdout_text()).ok_or_else(|| {
        BackupError::new(
            ErrorKind::CommandFailed,
            "filesystem usage output carries no 'Free (estimated)' figure",
        )
        .with_path(dest_mount)
    })
}

/// Pulls the byte figure out of a `Free (estimated): <bytes> ...` line.
pub(crate) fn parse_free_estimated(text: &str) -> Option<u64> {
    for line in text.lines() {
        if let Some(rest) = line.trim_start().strip_prefix("Free (estimated):") {
            return rest.split_whitespace().next()?.parse().ok();
        }
    }
    None
}
