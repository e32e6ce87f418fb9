//! Transfer identity verification.
//!
//! A pair of snapshots is trustworthy only when the destination's recorded
//! received UUID equals the source snapshot's own UUID. The same check
//! runs in two places: on the incremental parent BEFORE any bytes move
//! (a broken baseline is a refuse-to-proceed condition, not something to
//! discover after hours of streaming), and on the fresh pair after the
//! pipeline finishes.

use std::path::Path;

use snapsend_core::{BackupError, BackupResult, CancelToken, ErrorKind};
use tracing::debug;

use crate::subvolume::{SubvolumeInfo, show_subvolume};

/// Verifies the freshly transferred pair.
///
/// # Errors
///
/// [`ErrorKind::IdentifierMismatch`] carrying both observed values and a
/// scrub recommendation.
pub fn verify_transfer(
    source_snapshot: &Path,
    destination_snapshot: &Path,
    destination_mount: &Path,
    cancel: &CancelToken,
) -> BackupResult<()> {
    verify_pair(
        source_snapshot,
        destination_snapshot,
        destination_mount,
        "transferred snapshot",
        cancel,
    )
}

/// Confirms the incremental parent pair is still consistent.
///
/// # Errors
///
/// As [`verify_transfer`]; a failure here must abort the run before the
/// send begins.
pub fn verify_parent_pair(
    source_parent: &Path,
    destination_parent: &Path,
    destination_mount: &Path,
    cancel: &CancelToken,
) -> BackupResult<()> {
    verify_pair(
        source_parent,
        destination_parent,
        destination_mount,
        "incremental parent",
        cancel,
    )
}

fn verify_pair(
    source_path: &Path,
    destination_path: &Path,
    destination_mount: &Path,
    what: &str,
    cancel: &CancelToken,
) -> BackupResult<()> {
    let source = show_subvolume(source_path, cancel)?;
    let destination = show_subvolume(destination_path, cancel)?;
    check_identity(
        &source,
        &destination,
        source_path,
        destination_path,
        destination_mount,
        what,
    )?;
    debug!(source = %source_path.display(), uuid = %source.uuid, "identity verified");
    Ok(())
}

/// The pure identity rule over two already-fetched subvolume records.
///
/// Kept free of any tool invocation so the four ways a pair can lie
/// (source carrying a received UUID, destination missing one, a mismatch,
/// and the one honest case) stay checkable without a filesystem.
pub(crate) fn check_identity(
    source: &SubvolumeInfo,
    destination: &SubvolumeInfo,
    source_path: &Path,
    destination_path: &Path,
    destination_mount: &Path,
    what: &str,
) -> BackupResult<()> {
    if let Some(bogus) = &source.received_uuid {
        return Err(BackupError::new(
            ErrorKind::IdentifierMismatch,
            format!(
                "source {what} carries a received UUID ({bogus}); source snapshots never do"
            ),
        )
        .with_path(source_path)
        .with_suggestion(scrub_hint(destination_mount)));
    }

    let Some(received) = &destination.received_uuid else {
        return Err(BackupError::new(
            ErrorKind::IdentifierMismatch,
            format!(
                "destination {what} has no received UUID (source UUID is {})",
                source.uuid
            ),
        )
        .with_path(destination_path)
        .with_suggestion(scrub_hint(destination_mount)));
    };

    if !received.confirms(&source.uuid) {
        return Err(BackupError::new(
            ErrorKind::IdentifierMismatch,
            format!(
                "destination {what} records received UUID {received} but the source UUID is {}",
                source.uuid
            ),
        )
        .with_path(source_path)
        .with_path(destination_path)
        .with_suggestion(scrub_hint(destination_mount)));
    }

    Ok(())
}

fn scrub_hint(destination_mount: &Path) -> String {
    format!(
        "run 'btrfs scrub start {}' and take a fresh full backup",
        destination_mount.display()
    )
}

#[cfg(test)]
mod tests;
