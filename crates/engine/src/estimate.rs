//! Pre-flight transfer size estimation.
//!
//! Estimates exist to refuse doomed runs, not to promise anything: an
//! overshoot wastes nothing, an undershoot wastes hours. Hence every path
//! through this module applies a safety margin and a hard floor.

use std::io::Read;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use snapsend_core::size::MIB;
use snapsend_core::{BackupError, BackupResult, CancelToken, ErrorKind};
use tracing::{debug, warn};

use crate::command::{
    ToolInvocation, exit_code_of, interrupted, join_drain, kill_and_reap, spawn_drain,
    stderr_excerpt, wait_with_deadline,
};
use crate::subvolume::show_subvolume;

/// No estimate is ever smaller than this.
pub const ESTIMATE_FLOOR: u64 = 10 * MIB;

/// The dry-run stream is abandoned after this many bytes; past that point
/// the count already clears every realistic free-space check.
const DRY_RUN_BYTE_CAP: u64 = 10 * MIB;

const DRY_RUN_WAIT: Duration = Duration::from_secs(60);
const DU_DEADLINE: Duration = Duration::from_secs(300);

/// Estimates a full transfer: the subvolume's reported total bytes, with
/// `du` as the fallback when the show output lacks the field.
///
/// # Errors
///
/// Runner failures when both the show output and `du` are unusable.
pub fn estimate_full(source: &Path, cancel: &CancelToken) -> BackupResult<u64> {
    if let Ok(info) = show_subvolume(source, cancel)
        && let Some(total) = info.total_bytes
    {
        return Ok(total.max(ESTIMATE_FLOOR));
    }

    let output = ToolInvocation::new("du")
        .arg("-sb")
        .path_arg(source)
        .run(DU_DEADLINE, cancel)?;
    let text = output.stdout_text();
    let bytes: u64 = text
        .split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| {
            BackupError::new(
                ErrorKind::CommandFailed,
                "du produced no usable byte count",
            )
            .with_path(source)
        })?;
    Ok(bytes.max(ESTIMATE_FLOOR))
}

/// Estimates an incremental transfer from `parent` to `current`.
///
/// Primary path: a `--no-data` dry-run send piped into an in-process byte
/// counter, capped at 10 MiB, with a 5% margin. Fallback when the dry run
/// fails: 10% of the source size, with the same margin.
///
/// # Errors
///
/// Only cancellation propagates; every other dry-run failure degrades to
/// the fallback estimate.
pub fn estimate_incremental(
    parent: &Path,
    current: &Path,
    cancel: &CancelToken,
) -> BackupResult<u64> {
    match dry_run_count(parent, current, cancel) {
        Ok(counted) => {
            debug!(counted, "incremental dry run complete");
            Ok(dry_run_margin(counted))
        }
        Err(error) => {
            if cancel.is_cancelled() {
                return Err(error);
            }
            warn!(%error, "incremental dry run failed, falling back to a ratio estimate");
            let source_bytes = estimate_full(current, cancel)?;
            Ok(fallback_margin(source_bytes))
        }
    }
}

/// Dry-run estimate with its 5% margin and the floor applied.
pub(crate) fn dry_run_margin(counted: u64) -> u64 {
    (counted.saturating_mul(21) / 20).max(ESTIMATE_FLOOR)
}

/// Fallback estimate: 10% of the source, the 5% margin, and the floor.
pub(crate) fn fallback_margin(source_bytes: u64) -> u64 {
    (source_bytes.saturating_mul(21) / 200).max(ESTIMATE_FLOOR)
}

/// Counts bytes produced by a metadata-only send, truncated at the cap.
fn dry_run_count(parent: &Path, current: &Path, cancel: &CancelToken) -> BackupResult<u64> {
    let mut child = ToolInvocation::new("btrfs")
        .arg("send")
        .arg("--no-data")
        .arg("-p")
        .path_arg(parent)
        .path_arg(current)
        .spawn(Stdio::null(), Stdio::piped(), Stdio::piped())?;

    let mut stdout = child.stdout.take().ok_or_else(|| {
        BackupError::new(ErrorKind::StreamFailed, "dry-run send exposed no stdout")
    })?;
    let stderr_drain = child.stderr.take().map(spawn_drain);

    let mut counted: u64 = 0;
    let mut buffer = [0u8; 64 * 1024];
    loop {
        if cancel.is_cancelled() {
            kill_and_reap(&mut child);
            join_drain(stderr_drain);
            return Err(interrupted("size estimation"));
        }
        match stdout.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => {
                counted += read as u64;
                if counted >= DRY_RUN_BYTE_CAP {
                    kill_and_reap(&mut child);
                    join_drain(stderr_drain);
                    return Ok(DRY_RUN_BYTE_CAP);
                }
            }
            Err(error) => {
                kill_and_reap(&mut child);
                join_drain(stderr_drain);
                return Err(BackupError::new(
                    ErrorKind::CommandFailed,
                    format!("cannot read dry-run stream: {error}"),
                )
                .with_source(error));
            }
        }
    }
    drop(stdout);

    let status = wait_with_deadline(&mut child, DRY_RUN_WAIT, cancel, "dry-run send")?;
    let stderr = join_drain(stderr_drain);
    if !status.success() {
        return Err(BackupError::new(
            ErrorKind::CommandFailed,
            format!("dry-run send exited with status {}", exit_code_of(status)),
        )
        .with_exit_code(exit_code_of(status))
        .with_stderr(stderr_excerpt(&stderr)));
    }
    Ok(counted)
}
