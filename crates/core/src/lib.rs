#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `snapsend-core` hosts the pieces of the snapsend workspace that every
//! other crate depends on: the structured [`error`] model shared by the
//! engine and the CLI, the [`config`] surface loaded from TOML files and
//! command-line overrides, byte-count parsing and formatting in [`size`],
//! the cooperative [`cancel`] token observed at every blocking point, and
//! the narrow [`events`] observer interface through which the engine
//! reports progress without knowing anything about terminals.
//!
//! # Design
//!
//! The crate deliberately contains no I/O beyond reading a configuration
//! file. Everything here is a value type or a trait so the engine crate can
//! stay testable without a btrfs filesystem and the CLI crate can stay a
//! thin rendering layer.
//!
//! # Invariants
//!
//! - [`error::BackupError`] never replaces a primary failure with a
//!   follow-up failure; later errors are attached as suppressed causes.
//! - [`config::BackupConfig`] only accepts absolute paths; validation
//!   happens at load time so the engine can assume well-formed input.
//! - [`cancel::CancelToken`] is monotonic: once tripped it stays tripped
//!   for the lifetime of the run.

pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod exit_code;
pub mod size;

pub use cancel::CancelToken;
pub use config::{BackupConfig, ConfigFile};
pub use error::{BackupError, BackupResult, ErrorKind};
pub use events::{NullObserver, Observer, ProgressUpdate};
pub use exit_code::ExitCode;
