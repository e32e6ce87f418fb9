//! Incremental parent selection.
//!
//! The parent of an incremental transfer is the newest snapshot present in
//! BOTH snapshot directories, excluding the snapshot this run just created.
//! The exclusion is explicit: the current snapshot is always the newest
//! entry on the source side, and following it would make the run its own
//! parent. Ordering comes from the timestamp embedded in the name; the
//! filesystem mtime only breaks ties between equal timestamps.

use std::collections::HashSet;
use std::path::Path;
use std::time::SystemTime;

use snapsend_core::BackupResult;
use time::OffsetDateTime;
use tracing::debug;

use crate::snapshot::{list_snapshots, parse_snapshot_timestamp};

/// A source-side snapshot eligible to be an incremental parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParentCandidate {
    pub(crate) name: String,
    pub(crate) timestamp: OffsetDateTime,
    pub(crate) modified: Option<SystemTime>,
}

/// Picks the incremental parent for the current run, if any.
///
/// Returns `None` when the two sides share no usable snapshot, which makes
/// the run a full backup.
///
/// # Errors
///
/// Enumeration failures from either snapshot directory.
pub fn select_parent(
    source_dir: &Path,
    dest_dir: &Path,
    basename: &str,
    current_name: &str,
) -> BackupResult<Option<String>> {
    let mut candidates = Vec::new();
    for name in list_snapshots(source_dir, basename)? {
        let Some(timestamp) = parse_snapshot_timestamp(&name, basename) else {
            debug!(name, "ignoring snapshot with foreign name");
            continue;
        };
        let modified = std::fs::metadata(source_dir.join(&name))
            .and_then(|metadata| metadata.modified())
            .ok();
        candidates.push(ParentCandidate {
            name,
            timestamp,
            modified,
        });
    }

    let destination: HashSet<String> = list_snapshots(dest_dir, basename)?.into_iter().collect();
    Ok(newest_common(candidates, &destination, current_name))
}

/// The pure selection rule: newest by (embedded timestamp, mtime), present
/// on both sides, never the current snapshot.
pub(crate) fn newest_common(
    mut candidates: Vec<ParentCandidate>,
    destination: &HashSet<String>,
    current_name: &str,
) -> Option<String> {
    candidates.sort_by(|a, b| {
        (b.timestamp, b.modified).cmp(&(a.timestamp, a.modified))
    });
    candidates
        .into_iter()
        .find(|candidate| {
            candidate.name != current_name && destination.contains(&candidate.name)
        })
        .map(|candidate| candidate.name)
}
