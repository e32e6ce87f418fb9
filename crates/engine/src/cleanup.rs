//! Failure cleanup.
//!
//! Cleanup is driven by what was actually created, never by what was
//! planned: the source snapshot is removed only if the run got far enough
//! to create it, the destination snapshot only if it is present on disk,
//! and an orphan from a prior crashed run only if the scan finds one.
//! Cleanup itself is not cancellable; it runs to completion best-effort
//! and reports its failures for the caller to attach as suppressed causes.

use std::collections::HashSet;
use std::path::Path;

use snapsend_core::{BackupConfig, BackupError, CancelToken, ErrorKind, Observer};
use tracing::{info, warn};

use crate::snapshot::{delete_snapshot, list_snapshots, parse_snapshot_timestamp};

/// Removes the artifacts of a failed run; returns every cleanup failure.
pub fn cleanup_failed_run(
    config: &BackupConfig,
    snapshot_name: &str,
    snapshot_created: bool,
    observer: &dyn Observer,
) -> Vec<BackupError> {
    // Cleanup never observes the run's cancel token; a second Ctrl-C must
    // not leave half the artifacts behind.
    let no_cancel = CancelToken::new();
    let mut failures = Vec::new();

    if snapshot_created {
        remove_if_present(
            &config.source_snapshot_path(snapshot_name),
            "source snapshot",
            observer,
            &no_cancel,
            &mut failures,
        );
        remove_if_present(
            &config.destination_snapshot_path(snapshot_name),
            "destination snapshot",
            observer,
            &no_cancel,
            &mut failures,
        );
        return failures;
    }

    // The run never created its snapshot; look for leftovers of a prior
    // abnormal exit instead.
    match find_source_orphan(config) {
        Ok(Some(orphan)) => {
            info!(orphan, "removing orphan snapshot from a prior run");
            remove_if_present(
                &config.source_snapshot_path(&orphan),
                "orphan snapshot",
                observer,
                &no_cancel,
                &mut failures,
            );
        }
        Ok(None) => {}
        Err(error) => {
            warn!(%error, "orphan scan failed");
            failures.push(error);
        }
    }
    failures
}

fn remove_if_present(
    path: &Path,
    what: &str,
    observer: &dyn Observer,
    cancel: &CancelToken,
    failures: &mut Vec<BackupError>,
) {
    if !path.exists() {
        return;
    }
    observer.on_warn(&format!("cleanup: removing {what} {}", path.display()));
    if let Err(error) = delete_snapshot(path, cancel) {
        warn!(path = %path.display(), %error, "cleanup could not remove snapshot");
        failures.push(
            BackupError::new(
                ErrorKind::CleanupFailed,
                format!("cleanup could not remove {what}"),
            )
            .with_path(path)
            .with_source(error),
        );
    }
}

fn find_source_orphan(config: &BackupConfig) -> Result<Option<String>, BackupError> {
    let basename = config.source_basename();
    let source = list_snapshots(&config.snapshot_dir, basename)?;
    let destination: HashSet<String> =
        list_snapshots(&config.destination_mount, basename)?
            .into_iter()
            .collect();
    Ok(newest_orphan(&source, &destination, basename))
}

/// The newest dated source snapshot with no destination counterpart.
///
/// A snapshot present on both sides is a pair, not an orphan, whatever its
/// age; foreign names are left alone entirely.
pub(crate) fn newest_orphan(
    source: &[String],
    destination: &HashSet<String>,
    basename: &str,
) -> Option<String> {
    source
        .iter()
        .filter(|name| !destination.contains(*name))
        .filter_map(|name| parse_snapshot_timestamp(name, basename).map(|ts| (ts, name)))
        .max()
        .map(|(_, name)| name.clone())
}

#[cfg(test)]
mod tests;
