//! Structured error values shared across the workspace.
//!
//! Every fallible operation in snapsend returns a [`BackupError`]: a tagged
//! [`ErrorKind`], a human-readable message, a structured [`ErrorContext`]
//! (paths, argv, exit codes, captured stderr, a suggested operator action),
//! an optional cause, and any number of suppressed follow-up errors. The
//! suppressed list exists because failure cleanup may itself fail; those
//! secondary failures must never displace the error that triggered cleanup.

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

/// Result alias used throughout the snapsend workspace.
pub type BackupResult<T> = Result<T, BackupError>;

/// Classification of every failure the backup engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Another run holds the lock, or the lock file is unusable.
    LockUnavailable,
    /// A required path is not a mount point.
    MountMissing,
    /// Creating, deleting, or enumerating a snapshot failed.
    SnapshotOperationFailed,
    /// The destination does not have room for the estimated transfer.
    InsufficientSpace,
    /// A required external tool is not installed.
    DependencyMissing,
    /// The destination's received UUID does not match the source UUID.
    IdentifierMismatch,
    /// An external tool exited with a non-zero status.
    CommandFailed,
    /// Malformed caller input (paths, arguments, configuration).
    InvalidInput,
    /// The send/meter/receive pipeline broke mid-stream.
    StreamFailed,
    /// A bounded wait expired, or the run was interrupted.
    Timeout,
    /// Failure cleanup could not remove an artifact.
    CleanupFailed,
}

impl ErrorKind {
    /// Stable lowercase tag used in log output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LockUnavailable => "lock unavailable",
            Self::MountMissing => "mount missing",
            Self::SnapshotOperationFailed => "snapshot operation failed",
            Self::InsufficientSpace => "insufficient space",
            Self::DependencyMissing => "dependency missing",
            Self::IdentifierMismatch => "identifier mismatch",
            Self::CommandFailed => "command failed",
            Self::InvalidInput => "invalid input",
            Self::StreamFailed => "stream failed",
            Self::Timeout => "timeout",
            Self::CleanupFailed => "cleanup failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured diagnostic context attached to a [`BackupError`].
///
/// Context never carries secrets; paths, exit codes, and captured tool
/// output are all it holds.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    paths: Vec<PathBuf>,
    argv: Option<String>,
    exit_code: Option<i32>,
    stderr: Option<String>,
    suggestion: Option<String>,
}

impl ErrorContext {
    /// Paths involved in the failing operation, in the order they were attached.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// The rendered command line of the failing tool invocation, if any.
    #[must_use]
    pub fn argv(&self) -> Option<&str> {
        self.argv.as_deref()
    }

    /// The exit code of the failing tool invocation, if any.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Captured stderr excerpt of the failing tool invocation, if any.
    #[must_use]
    pub fn stderr(&self) -> Option<&str> {
        self.stderr.as_deref()
    }

    /// A suggested operator action, if one is known.
    #[must_use]
    pub fn suggestion(&self) -> Option<&str> {
        self.suggestion.as_deref()
    }
}

/// Error value carried by every fallible operation in the workspace.
#[derive(Debug)]
pub struct BackupError {
    kind: ErrorKind,
    message: String,
    context: ErrorContext,
    source: Option<Box<dyn Error + Send + Sync>>,
    suppressed: Vec<BackupError>,
}

impl BackupError {
    /// Creates a new error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
            suppressed: Vec::new(),
        }
    }

    /// Attaches a path to the error context.
    #[must_use]
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.context.paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Attaches the rendered command line of the failing invocation.
    #[must_use]
    pub fn with_argv(mut self, argv: impl Into<String>) -> Self {
        self.context.argv = Some(argv.into());
        self
    }

    /// Attaches the exit code of the failing invocation.
    #[must_use]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.context.exit_code = Some(code);
        self
    }

    /// Attaches a captured stderr excerpt.
    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.context.stderr = Some(stderr.into());
        self
    }

    /// Attaches a suggested operator action.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestion = Some(suggestion.into());
        self
    }

    /// Attaches an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Attaches a follow-up error without displacing this one.
    ///
    /// Used by failure cleanup: the cleanup error rides along as diagnostic
    /// detail while the original failure stays the primary report.
    pub fn push_suppressed(&mut self, error: BackupError) {
        self.suppressed.push(error);
    }

    /// The error's classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable message, without context or suggestions.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The structured context attached to this error.
    #[must_use]
    pub const fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Follow-up errors attached during cleanup.
    #[must_use]
    pub fn suppressed(&self) -> &[BackupError] {
        &self.suppressed
    }
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(argv) = self.context.argv() {
            write!(f, " (command: {argv})")?;
        }
        if let Some(code) = self.context.exit_code() {
            write!(f, " (exit code {code})")?;
        }
        if let Some(suggestion) = self.context.suggestion() {
            write!(f, "; suggestion: {suggestion}")?;
        }
        Ok(())
    }
}

impl Error for BackupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn Error + 'static))
    }
}

impl From<std::io::Error> for BackupError {
    fn from(error: std::io::Error) -> Self {
        let kind = match error.kind() {
            std::io::ErrorKind::PermissionDenied => ErrorKind::InvalidInput,
            std::io::ErrorKind::NotFound => ErrorKind::DependencyMissing,
            _ => ErrorKind::CommandFailed,
        };
        Self::new(kind, error.to_string()).with_source(error)
    }
}

#[cfg(test)]
mod tests {
    use super::{BackupError, ErrorKind};
    use std::error::Error as _;
    use std::io;
    use std::path::Path;

    #[test]
    fn display_includes_kind_context_and_suggestion() {
        let error = BackupError::new(ErrorKind::CommandFailed, "btrfs refused")
            .with_argv("/usr/bin/btrfs subvolume show /data")
            .with_exit_code(1)
            .with_suggestion("check that /data is a subvolume");

        let rendered = error.to_string();
        assert!(rendered.starts_with("command failed: btrfs refused"));
        assert!(rendered.contains("exit code 1"));
        assert!(rendered.contains("check that /data is a subvolume"));
    }

    #[test]
    fn suppressed_errors_do_not_displace_the_primary() {
        let mut primary = BackupError::new(ErrorKind::StreamFailed, "receive died");
        primary.push_suppressed(BackupError::new(
            ErrorKind::CleanupFailed,
            "could not delete partial snapshot",
        ));

        assert_eq!(primary.kind(), ErrorKind::StreamFailed);
        assert_eq!(primary.suppressed().len(), 1);
        assert_eq!(primary.suppressed()[0].kind(), ErrorKind::CleanupFailed);
    }

    #[test]
    fn io_permission_denied_maps_to_invalid_input() {
        let io = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let error = BackupError::from(io);
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
        assert!(error.source().is_some());
    }

    #[test]
    fn context_records_paths_in_attachment_order() {
        let error = BackupError::new(ErrorKind::SnapshotOperationFailed, "delete failed")
            .with_path("/data/.snapshots/data.2025-01-01T00:00:00Z")
            .with_path("/mnt/backup/data.2025-01-01T00:00:00Z");

        let paths = error.context().paths();
        assert_eq!(paths.len(), 2);
        assert_eq!(
            paths[0],
            Path::new("/data/.snapshots/data.2025-01-01T00:00:00Z")
        );
    }
}
