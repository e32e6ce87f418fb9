//! The three-stage transfer pipeline: `btrfs send | pv | btrfs receive`.
//!
//! Each stage is spawned as its own child with retained handles. The data
//! path is plain OS pipes; the engine never touches the stream bytes, so
//! the send tool's framing survives untouched. What the engine does own is
//! status reconciliation: after the stream ends, all three exit statuses
//! are collected and the failure, if any, is attributed to the FIRST
//! failing stage in pipeline order. A dead receive makes send die of a
//! broken pipe; reporting the broken pipe would blame the wrong tool.

use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use snapsend_core::{
    BackupError, BackupResult, CancelToken, ErrorKind, Observer, ProgressUpdate,
};
use tracing::{debug, warn};

use crate::command::{
    ToolInvocation, exit_code_of, interrupted, kill_and_reap, stderr_excerpt, wait_with_deadline,
};
use crate::snapshot::delete_snapshot;

/// How long a downstream stage may take to exit once its upstream is done.
const STAGE_WAIT: Duration = Duration::from_secs(300);

/// The send stage is waited on without a deadline: it runs as long as the
/// stream does, and a dead downstream reaches it as a broken pipe anyway.
/// Only cancellation cuts it short.
const STREAM_WAIT: Duration = Duration::MAX;

/// Everything the pipeline needs to know about one transfer.
#[derive(Debug)]
pub struct PipelinePlan<'a> {
    /// Source snapshot being sent.
    pub snapshot_path: &'a Path,
    /// Incremental parent, when one exists on both sides.
    pub parent_path: Option<&'a Path>,
    /// Directory `btrfs receive` unpacks into.
    pub destination_dir: &'a Path,
    /// Where the received snapshot will appear; probed for partial-artifact
    /// cleanup when the pipeline fails.
    pub destination_snapshot_path: &'a Path,
    /// Pre-flight size estimate, handed to the meter for percentages.
    pub estimated_bytes: u64,
}

/// Pipeline stages in data-flow order. The order is load-bearing: failure
/// attribution walks it front to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Stage {
    Send,
    Meter,
    Receive,
}

impl Stage {
    pub(crate) const fn label(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Meter => "meter",
            Self::Receive => "receive",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Runs the transfer to completion.
///
/// # Errors
///
/// - [`ErrorKind::StreamFailed`] naming the first failing stage, with that
///   stage's captured stderr in context.
/// - [`ErrorKind::Timeout`] when a stage outlives its post-EOF deadline or
///   the cancel token trips.
///
/// On failure, a half-written destination snapshot (receive had already
/// started) is removed before the error is returned; a removal failure
/// rides along as a suppressed cause.
pub fn run_pipeline(
    plan: &PipelinePlan<'_>,
    observer: &dyn Observer,
    cancel: &CancelToken,
) -> BackupResult<()> {
    let mut send_invocation = ToolInvocation::new("btrfs").arg("send");
    if let Some(parent) = plan.parent_path {
        send_invocation = send_invocation.arg("-p").path_arg(parent);
    }
    let send_invocation = send_invocation.path_arg(plan.snapshot_path);

    let meter_invocation = ToolInvocation::new("pv")
        .arg("-f")
        .arg("-n")
        .arg("-b")
        .arg("-i")
        .arg("1")
        .arg("-s")
        .arg(plan.estimated_bytes.to_string());

    let receive_invocation = ToolInvocation::new("btrfs")
        .arg("receive")
        .path_arg(plan.destination_dir);

    let mut send = send_invocation.spawn(Stdio::null(), Stdio::piped(), Stdio::piped())?;
    let Some(send_stdout) = send.stdout.take() else {
        kill_and_reap(&mut send);
        return Err(BackupError::new(
            ErrorKind::StreamFailed,
            "send stage exposed no stdout",
        ));
    };

    let mut meter =
        match meter_invocation.spawn(Stdio::from(send_stdout), Stdio::piped(), Stdio::piped()) {
            Ok(child) => child,
            Err(error) => {
                kill_and_reap(&mut send);
                return Err(error);
            }
        };
    let Some(meter_stdout) = meter.stdout.take() else {
        kill_and_reap(&mut send);
        kill_and_reap(&mut meter);
        return Err(BackupError::new(
            ErrorKind::StreamFailed,
            "meter stage exposed no stdout",
        ));
    };

    let mut receive =
        match receive_invocation.spawn(Stdio::from(meter_stdout), Stdio::null(), Stdio::piped()) {
            Ok(child) => child,
            Err(error) => {
                kill_and_reap(&mut send);
                kill_and_reap(&mut meter);
                return Err(error);
            }
        };

    debug!(
        snapshot = %plan.snapshot_path.display(),
        incremental = plan.parent_path.is_some(),
        estimate = plan.estimated_bytes,
        "transfer pipeline started"
    );

    let started = Instant::now();
    let send_stderr = send.stderr.take();
    let meter_stderr = meter.stderr.take();
    let receive_stderr = receive.stderr.take();

    let (outcome, captured) = thread::scope(|scope| {
        let send_drain = scope.spawn(move || match send_stderr {
            Some(mut pipe) => {
                let mut buffer = Vec::new();
                let _ = pipe.read_to_end(&mut buffer);
                buffer
            }
            None => Vec::new(),
        });
        let meter_drain = scope.spawn(move || {
            meter_stderr.map_or_else(Vec::new, |pipe| {
                observe_meter(pipe, plan.estimated_bytes, started, observer)
            })
        });
        let receive_drain = scope.spawn(move || {
            receive_stderr.map_or_else(Vec::new, |pipe| observe_receive(pipe, observer))
        });

        // Send finishes when the stream does; the later stages then get a
        // bounded grace period to flush and exit.
        let waits = [
            (
                Stage::Send,
                wait_with_deadline(&mut send, STREAM_WAIT, cancel, Stage::Send.label())
                    .map(exit_code_of),
            ),
            (Stage::Meter, await_stage(&mut meter, Stage::Meter, cancel)),
            (
                Stage::Receive,
                await_stage(&mut receive, Stage::Receive, cancel),
            ),
        ];

        let captured = [
            send_drain.join().unwrap_or_default(),
            meter_drain.join().unwrap_or_default(),
            receive_drain.join().unwrap_or_default(),
        ];
        (waits, captured)
    });

    let primary = reconcile(&outcome, &captured, cancel);
    let Some(mut primary) = primary else {
        debug!("transfer pipeline completed cleanly");
        return Ok(());
    };

    // Receive creates the destination subvolume as its first act, so its
    // presence on disk, not the plan, decides whether there is anything to undo.
    if plan.destination_snapshot_path.exists() {
        observer.on_warn(&format!(
            "removing partial destination snapshot {}",
            plan.destination_snapshot_path.display()
        ));
        if let Err(cleanup_error) =
            delete_snapshot(plan.destination_snapshot_path, &CancelToken::new())
        {
            warn!(%cleanup_error, "partial destination snapshot survived cleanup");
            primary.push_suppressed(cleanup_error);
        }
    }

    Err(primary)
}

/// Waits for one stage, killing it on deadline expiry or cancellation.
fn await_stage(child: &mut Child, stage: Stage, cancel: &CancelToken) -> BackupResult<i32> {
    wait_with_deadline(child, STAGE_WAIT, cancel, stage.label()).map(exit_code_of)
}

/// Attributes the pipeline outcome to the first failing stage, if any.
///
/// Precedence: cancellation first (every stage was killed, blaming one is
/// noise), then wait failures in stage order, then non-zero exits in stage
/// order.
fn reconcile(
    outcome: &[(Stage, BackupResult<i32>); 3],
    captured: &[Vec<u8>; 3],
    cancel: &CancelToken,
) -> Option<BackupError> {
    if cancel.is_cancelled() {
        return Some(interrupted("transfer pipeline"));
    }

    for (index, (stage, waited)) in outcome.iter().enumerate() {
        if let Err(error) = waited {
            return Some(
                BackupError::new(
                    ErrorKind::Timeout,
                    format!("{stage} stage did not exit: {}", error.message()),
                )
                .with_stderr(stderr_excerpt(&captured[index])),
            );
        }
    }

    let codes = [
        outcome[0].1.as_ref().copied().unwrap_or(0),
        outcome[1].1.as_ref().copied().unwrap_or(0),
        outcome[2].1.as_ref().copied().unwrap_or(0),
    ];
    first_failure(codes, captured)
}

/// The pure attribution rule over the three exit codes.
pub(crate) fn first_failure(
    codes: [i32; 3],
    captured: &[Vec<u8>; 3],
) -> Option<BackupError> {
    const STAGES: [Stage; 3] = [Stage::Send, Stage::Meter, Stage::Receive];
    for (index, stage) in STAGES.into_iter().enumerate() {
        if codes[index] != 0 {
            return Some(
                BackupError::new(
                    ErrorKind::StreamFailed,
                    format!("{stage} stage exited with status {}", codes[index]),
                )
                .with_exit_code(codes[index])
                .with_stderr(stderr_excerpt(&captured[index])),
            );
        }
    }
    None
}

/// Drains the meter's stderr, surfacing byte counts as progress samples.
fn observe_meter(
    pipe: impl Read,
    total_estimated: u64,
    started: Instant,
    observer: &dyn Observer,
) -> Vec<u8> {
    let mut captured = Vec::new();
    for line in BufReader::new(pipe).lines() {
        let Ok(line) = line else { break };
        captured.extend_from_slice(line.as_bytes());
        captured.push(b'\n');
        if let Some(bytes) = parse_meter_bytes(&line) {
            observer.on_progress(&progress_update(bytes, total_estimated, started.elapsed()));
        }
    }
    captured
}

/// Drains receive's stderr, dropping per-extent write chatter.
fn observe_receive(pipe: impl Read, observer: &dyn Observer) -> Vec<u8> {
    let mut captured = Vec::new();
    for line in BufReader::new(pipe).lines() {
        let Ok(line) = line else { break };
        captured.extend_from_slice(line.as_bytes());
        captured.push(b'\n');
        if !is_receive_noise(&line) && !line.trim().is_empty() {
            observer.on_info(line.trim());
        }
    }
    captured
}

/// Whether a receive stderr line is per-extent chatter (`write .* offset=`).
pub(crate) fn is_receive_noise(line: &str) -> bool {
    line.find("write ")
        .is_some_and(|index| line[index..].contains("offset="))
}

/// A byte count as emitted by the meter in numeric mode.
pub(crate) fn parse_meter_bytes(line: &str) -> Option<u64> {
    line.trim().parse().ok()
}

/// Builds a progress sample from a raw byte count.
pub(crate) fn progress_update(
    bytes_transferred: u64,
    total_estimated: u64,
    elapsed: Duration,
) -> ProgressUpdate {
    let seconds = elapsed.as_secs_f64();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let throughput = if seconds > 0.05 {
        (bytes_transferred as f64 / seconds) as u64
    } else {
        0
    };
    let eta = (throughput > 0 && total_estimated > bytes_transferred)
        .then(|| Duration::from_secs((total_estimated - bytes_transferred) / throughput));
    ProgressUpdate {
        bytes_transferred,
        total_estimated,
        throughput,
        elapsed,
        eta,
    }
}

#[cfg(test)]
mod tests;
