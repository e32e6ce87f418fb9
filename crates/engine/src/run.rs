//! Run orchestration and the per-invocation state machine.
//!
//! A run is strictly sequential: lock, mounts, snapshot, parent, estimate,
//! space, pipeline, verification, retention. The state machine exists
//! because failure handling depends on how far the run got.
//! `snapshot_created` is set the moment the source snapshot exists and is
//! never cleared; it is what tells cleanup that a source artifact may need
//! removing. `backup_successful` is set only after verification, never
//! earlier.

use snapsend_core::size::format_bytes;
use snapsend_core::{BackupConfig, BackupResult, CancelToken, Observer};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::cleanup::cleanup_failed_run;
use crate::estimate::{estimate_full, estimate_incremental};
use crate::lock;
use crate::mount::ensure_mounted;
use crate::parent::select_parent;
use crate::pipeline::{PipelinePlan, run_pipeline};
use crate::retention::{RetentionPolicy, prune_side};
use crate::snapshot::{create_readonly_snapshot, mint_snapshot_name};
use crate::space::ensure_space;
use crate::verify::{verify_parent_pair, verify_transfer};

/// Whether a run streams everything or a delta against a parent pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupKind {
    /// No common ancestor: the whole subvolume is sent.
    Full,
    /// A consistent pair exists on both sides; only the delta is sent.
    Incremental {
        /// Name of the parent snapshot shared by both sides.
        parent: String,
    },
}

/// What a successful run did, for the frontend's closing report.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Name of the snapshot created and transferred by this run.
    pub snapshot_name: String,
    /// Whether the transfer was full or incremental.
    pub kind: BackupKind,
    /// The pre-flight size estimate that gated the run.
    pub estimated_bytes: u64,
    /// Snapshots pruned from the source side by retention.
    pub pruned_source: usize,
    /// Snapshots pruned from the destination side by retention.
    pub pruned_destination: usize,
}

/// Run phases in order; failure handling compares against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Initial,
    Locked,
    Mounted,
    SnapshotCreated,
    Ready,
    Approved,
    Transferred,
    Verified,
    Retained,
}

#[derive(Debug)]
struct RunState {
    snapshot_name: String,
    snapshot_created: bool,
    backup_successful: bool,
    phase: Phase,
}

impl RunState {
    fn new() -> Self {
        Self {
            snapshot_name: String::new(),
            snapshot_created: false,
            backup_successful: false,
            phase: Phase::Initial,
        }
    }

    fn advance(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "run state transition");
        self.phase = phase;
    }
}

/// Performs one complete backup run.
///
/// The lock is released on every exit path. Failures after the mounts were
/// verified trigger cleanup; cleanup failures ride along as suppressed
/// causes on the primary error. Failures before that point (lock, mounts,
/// missing tools) have no filesystem side-effect to undo and are returned
/// as-is.
///
/// # Errors
///
/// Any [`snapsend_core::ErrorKind`]; see the component modules.
pub fn run_backup(
    config: &BackupConfig,
    observer: &dyn Observer,
    cancel: &CancelToken,
) -> BackupResult<RunSummary> {
    let guard = lock::acquire(&config.lock_file, cancel)?;
    let mut state = RunState::new();
    state.advance(Phase::Locked);

    let outcome = execute(config, observer, cancel, &mut state);
    let outcome = match outcome {
        Ok(summary) => Ok(summary),
        Err(mut error) => {
            if state.phase >= Phase::Mounted && !state.backup_successful {
                for failure in cleanup_failed_run(
                    config,
                    &state.snapshot_name,
                    state.snapshot_created,
                    observer,
                ) {
                    error.push_suppressed(failure);
                }
            }
            Err(error)
        }
    };
    drop(guard);
    outcome
}

fn execute(
    config: &BackupConfig,
    observer: &dyn Observer,
    cancel: &CancelToken,
    state: &mut RunState,
) -> BackupResult<RunSummary> {
    ensure_mounted(&config.source_volume, cancel)?;
    ensure_mounted(&config.destination_mount, cancel)?;
    state.advance(Phase::Mounted);

    let basename = config.source_basename();
    let snapshot_name = mint_snapshot_name(basename, OffsetDateTime::now_utc())?;
    state.snapshot_name.clone_from(&snapshot_name);

    let snapshot_path = config.source_snapshot_path(&snapshot_name);
    create_readonly_snapshot(&config.source_volume, &snapshot_path, cancel)?;
    state.snapshot_created = true;
    state.advance(Phase::SnapshotCreated);
    observer.on_info(&format!("created snapshot {snapshot_name}"));

    let kind = match select_parent(
        &config.snapshot_dir,
        &config.destination_mount,
        basename,
        &snapshot_name,
    )? {
        Some(parent) => BackupKind::Incremental { parent },
        None => BackupKind::Full,
    };
    state.advance(Phase::Ready);

    let parent_path = match &kind {
        BackupKind::Incremental { parent } => {
            observer.on_info(&format!("incremental transfer against {parent}"));
            let source_parent = config.source_snapshot_path(parent);
            let destination_parent = config.destination_snapshot_path(parent);
            verify_parent_pair(
                &source_parent,
                &destination_parent,
                &config.destination_mount,
                cancel,
            )?;
            Some(source_parent)
        }
        BackupKind::Full => {
            observer.on_info("no common parent snapshot; taking a full backup");
            None
        }
    };

    let estimated_bytes = match &parent_path {
        Some(parent) => estimate_incremental(parent, &snapshot_path, cancel)?,
        None => estimate_full(&snapshot_path, cancel)?,
    };
    info!(estimated_bytes, "transfer size estimated");

    let available = ensure_space(
        &config.destination_mount,
        estimated_bytes,
        config.min_free_bytes,
        cancel,
    )?;
    state.advance(Phase::Approved);
    observer.on_info(&format!(
        "estimated {} to transfer, {} free on destination",
        format_bytes(estimated_bytes),
        format_bytes(available),
    ));

    let destination_snapshot_path = config.destination_snapshot_path(&snapshot_name);
    run_pipeline(
        &PipelinePlan {
            snapshot_path: &snapshot_path,
            parent_path: parent_path.as_deref(),
            destination_dir: &config.destination_mount,
            destination_snapshot_path: &destination_snapshot_path,
            estimated_bytes,
        },
        observer,
        cancel,
    )?;
    state.advance(Phase::Transferred);

    verify_transfer(
        &snapshot_path,
        &destination_snapshot_path,
        &config.destination_mount,
        cancel,
    )?;
    state.backup_successful = true;
    state.advance(Phase::Verified);
    observer.on_info(&format!("verified {snapshot_name} on both sides"));

    let policy = RetentionPolicy {
        retention_days: config.retention_days,
        keep_minimum: config.keep_minimum,
    };
    let now = OffsetDateTime::now_utc();
    let mut pruned = [0usize; 2];
    for (index, dir) in [&config.snapshot_dir, &config.destination_mount]
        .into_iter()
        .enumerate()
    {
        match prune_side(dir, basename, &policy, now, observer, cancel) {
            Ok(count) => pruned[index] = count,
            // The backup itself is already verified; a retention hiccup is
            // not worth failing the run and deleting what we just made.
            Err(error) => observer.on_warn(&format!("retention pruning failed: {error}")),
        }
    }
    state.advance(Phase::Retained);

    Ok(RunSummary {
        snapshot_name,
        kind,
        estimated_bytes,
        pruned_source: pruned[0],
        pruned_destination: pruned[1],
    })
}

#[cfg(test)]
mod tests;
