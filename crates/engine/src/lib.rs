#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `snapsend-engine` is the backup coordination engine. One call to
//! [`run::run_backup`] performs a complete run: acquire the single-instance
//! lock, verify both mount points, create a read-only source snapshot, pick
//! the incremental parent (if both sides still hold a consistent pair),
//! estimate the transfer size, check destination free space, drive the
//! `btrfs send | pv | btrfs receive` pipeline, verify the received UUID,
//! and prune old snapshots.
//!
//! # Design
//!
//! Every interaction with the host filesystem goes through the allow-listed
//! [`command`] runner; the engine never shells out. The pipeline spawns its
//! three stages as separate children with retained handles so each stage's
//! exit status can be reported accurately: a downstream failure makes the
//! upstream tool see a broken pipe, and blaming the upstream tool for that
//! would send the operator in the wrong direction.
//!
//! # Invariants
//!
//! - No mutating operation runs before the lock guard is held.
//! - A snapshot is immutable once created; only failure cleanup and
//!   retention pruning ever delete one.
//! - The destination is never left silently divergent: a run either ends
//!   with a verified pair or with both halves of the failed transfer
//!   removed.
//!
//! # Errors
//!
//! All operations return [`snapsend_core::BackupError`]. Errors raised
//! after the source snapshot exists trigger failure cleanup; cleanup's own
//! failures ride along as suppressed causes and never displace the
//! original error.

pub mod cleanup;
pub mod command;
pub mod estimate;
pub mod lock;
pub mod mount;
pub mod parent;
pub mod pipeline;
pub mod retention;
pub mod run;
pub mod snapshot;
pub mod space;
pub mod subvolume;
pub mod verify;

pub use run::{BackupKind, RunSummary, run_backup};
