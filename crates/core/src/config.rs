//! Run configuration: TOML file keys, CLI overrides, and validation.
//!
//! Loading happens in two steps. [`ConfigFile`] is the raw, all-optional
//! shape deserialized from a TOML file; the CLI layers its flag overrides
//! on top of it and then calls [`ConfigFile::into_config`], which applies
//! defaults and validates everything once. The engine only ever sees the
//! validated [`BackupConfig`] and may assume absolute, well-formed paths.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{BackupError, BackupResult, ErrorKind};
use crate::size::GIB;

/// Lock file used when neither the configuration nor the CLI names one.
pub const DEFAULT_LOCK_FILE: &str = "/run/lock/snapsend.lock";

/// Directory under the source volume that holds source-side snapshots when
/// no `snapshot_dir` is configured.
pub const DEFAULT_SNAPSHOT_SUBDIR: &str = ".snapshots";

/// Raw configuration as read from a TOML file, before defaults apply.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Absolute path of the subvolume to back up.
    pub source_volume: Option<PathBuf>,
    /// Absolute path of the directory holding source-side snapshots.
    pub snapshot_dir: Option<PathBuf>,
    /// Absolute path where the destination filesystem is mounted.
    pub destination_mount: Option<PathBuf>,
    /// Safety buffer added to size estimates, in whole GiB.
    pub min_free_gb: Option<u64>,
    /// Absolute path of the single-instance lock file.
    pub lock_file: Option<PathBuf>,
    /// Age threshold for pruning, in days; 0 disables pruning.
    pub retention_days: Option<u32>,
    /// Floor on the snapshot count retained per side.
    pub keep_minimum: Option<usize>,
    /// Whether the frontend should render a progress bar.
    pub show_progress: Option<bool>,
    /// Byte-precise override of the safety buffer. Not a file key; set by
    /// the CLI when `--min-free-gb` carries a size suffix.
    #[serde(skip)]
    pub min_free_bytes: Option<u64>,
}

impl ConfigFile {
    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Unreadable files and TOML syntax or schema problems are reported as
    /// [`ErrorKind::InvalidInput`] with the offending path attached.
    pub fn load(path: &Path) -> BackupResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|error| {
            BackupError::new(
                ErrorKind::InvalidInput,
                format!("cannot read configuration file: {error}"),
            )
            .with_path(path)
            .with_source(error)
        })?;
        Self::from_toml_str(&text).map_err(|error| error.with_path(path))
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidInput`] for syntax errors and unknown keys.
    pub fn from_toml_str(text: &str) -> BackupResult<Self> {
        toml::from_str(text).map_err(|error| {
            BackupError::new(
                ErrorKind::InvalidInput,
                format!("malformed configuration: {error}"),
            )
            .with_source(error)
        })
    }

    /// Applies defaults and validates, producing the engine-facing config.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidInput`] when a required key is missing,
    /// a path is not absolute, the source volume has no basename, or
    /// `keep_minimum` is zero.
    pub fn into_config(self) -> BackupResult<BackupConfig> {
        let source_volume = require_absolute("source_volume", self.source_volume)?;
        let destination_mount = require_absolute("destination_mount", self.destination_mount)?;

        if source_volume.file_name().is_none() {
            return Err(BackupError::new(
                ErrorKind::InvalidInput,
                "source_volume has no usable basename",
            )
            .with_path(&source_volume));
        }

        let snapshot_dir = match self.snapshot_dir {
            Some(dir) => require_absolute("snapshot_dir", Some(dir))?,
            None => source_volume.join(DEFAULT_SNAPSHOT_SUBDIR),
        };
        let lock_file = match self.lock_file {
            Some(path) => require_absolute("lock_file", Some(path))?,
            None => PathBuf::from(DEFAULT_LOCK_FILE),
        };

        let keep_minimum = self.keep_minimum.unwrap_or(1);
        if keep_minimum == 0 {
            return Err(BackupError::new(
                ErrorKind::InvalidInput,
                "keep_minimum must be at least 1: the newest pair is the next run's parent",
            ));
        }

        let min_free_bytes = self
            .min_free_bytes
            .unwrap_or_else(|| self.min_free_gb.unwrap_or(1).saturating_mul(GIB));

        Ok(BackupConfig {
            source_volume,
            snapshot_dir,
            destination_mount,
            min_free_bytes,
            lock_file,
            retention_days: self.retention_days.unwrap_or(0),
            keep_minimum,
            show_progress: self.show_progress.unwrap_or(true),
        })
    }
}

/// Validated configuration consumed by the engine.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Absolute path of the subvolume to back up.
    pub source_volume: PathBuf,
    /// Absolute path of the directory holding source-side snapshots.
    pub snapshot_dir: PathBuf,
    /// Absolute path where the destination filesystem is mounted; received
    /// snapshots land directly under it.
    pub destination_mount: PathBuf,
    /// Safety buffer added to size estimates, in bytes.
    pub min_free_bytes: u64,
    /// Absolute path of the single-instance lock file.
    pub lock_file: PathBuf,
    /// Age threshold for pruning, in days; 0 disables pruning.
    pub retention_days: u32,
    /// Floor on the snapshot count retained per side. Always ≥ 1.
    pub keep_minimum: usize,
    /// Whether the frontend should render a progress bar.
    pub show_progress: bool,
}

impl BackupConfig {
    /// Basename of the source volume; the prefix of every snapshot name.
    #[must_use]
    pub fn source_basename(&self) -> &str {
        self.source_volume
            .file_name()
            .map_or("", |name| name.to_str().unwrap_or(""))
    }

    /// Full source-side path of a named snapshot.
    #[must_use]
    pub fn source_snapshot_path(&self, name: &str) -> PathBuf {
        self.snapshot_dir.join(name)
    }

    /// Full destination-side path of a named snapshot.
    #[must_use]
    pub fn destination_snapshot_path(&self, name: &str) -> PathBuf {
        self.destination_mount.join(name)
    }
}

fn require_absolute(key: &str, value: Option<PathBuf>) -> BackupResult<PathBuf> {
    let path = value.ok_or_else(|| {
        BackupError::new(ErrorKind::InvalidInput, format!("{key} is not configured"))
    })?;
    if !path.is_absolute() {
        return Err(BackupError::new(
            ErrorKind::InvalidInput,
            format!("{key} must be an absolute path"),
        )
        .with_path(&path));
    }
    Ok(path)
}
