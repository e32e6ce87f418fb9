//! Age-based retention pruning.
//!
//! After a verified run, snapshots older than the configured cutoff are
//! pruned from both sides, subject to a per-side floor. The floor is what
//! keeps the next run incremental: with `keep_minimum >= 1` the newest
//! pair always survives to serve as the parent. Age is judged by the
//! timestamp embedded in the snapshot name; when filesystem mtimes
//! disagree (clock skew between the two sides), the embedded timestamp
//! wins. Names this engine did not mint are never pruned.

use std::path::Path;

use snapsend_core::{BackupResult, CancelToken, Observer};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::snapshot::{delete_snapshot, list_snapshots, parse_snapshot_timestamp};

/// When and how aggressively to prune.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Snapshots older than this many days are candidates; 0 disables.
    pub retention_days: u32,
    /// Never reduce a side below this many dated snapshots.
    pub keep_minimum: usize,
}

impl RetentionPolicy {
    /// Whether pruning is enabled at all.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.retention_days > 0
    }
}

/// Prunes one side's snapshot directory; returns how many were removed.
///
/// Deletion failures are reported and skipped: retention runs after the
/// backup has already succeeded, and a stuck old snapshot is no reason to
/// fail the run.
///
/// # Errors
///
/// Only enumeration failures; the caller downgrades those to warnings.
pub fn prune_side(
    dir: &Path,
    basename: &str,
    policy: &RetentionPolicy,
    now: OffsetDateTime,
    observer: &dyn Observer,
    cancel: &CancelToken,
) -> BackupResult<usize> {
    if !policy.enabled() {
        return Ok(0);
    }

    let names = list_snapshots(dir, basename)?;
    let doomed = prune_candidates(&names, basename, policy, now);

    let mut removed = 0;
    for name in doomed {
        let path = dir.join(&name);
        match delete_snapshot(&path, cancel) {
            Ok(()) => {
                info!(snapshot = %path.display(), "pruned expired snapshot");
                observer.on_info(&format!("pruned {}", path.display()));
                removed += 1;
            }
            Err(error) => {
                warn!(snapshot = %path.display(), %error, "could not prune snapshot");
                observer.on_warn(&format!("could not prune {}: {error}", path.display()));
            }
        }
    }
    Ok(removed)
}

/// The pure pruning rule: expired names, oldest first, stopping before the
/// floor would be breached.
pub(crate) fn prune_candidates(
    names: &[String],
    basename: &str,
    policy: &RetentionPolicy,
    now: OffsetDateTime,
) -> Vec<String> {
    let mut dated: Vec<(OffsetDateTime, &String)> = names
        .iter()
        .filter_map(|name| {
            parse_snapshot_timestamp(name, basename).map(|timestamp| (timestamp, name))
        })
        .collect();
    dated.sort();

    let cutoff = now - Duration::days(i64::from(policy.retention_days));
    let prunable = dated.len().saturating_sub(policy.keep_minimum);

    dated
        .into_iter()
        .take(prunable)
        .take_while(|(timestamp, _)| *timestamp < cutoff)
        .map(|(_, name)| name.clone())
        .collect()
}
