//! Single-instance run lock.
//!
//! The lock is a file created with `O_CREAT | O_EXCL` and mode 0600 holding
//! the owner's pid, plus an advisory exclusive `flock` on the open
//! descriptor. `O_EXCL` is what makes acquisition atomic; the flock exists
//! so `fuser`-style tooling can see the owner. A leftover file from a
//! crashed run is detected by probing the stored pid with signal 0 and
//! reclaimed exactly once.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rustix::fs::{FlockOperation, Mode, OFlags};
use rustix::io::Errno;
use rustix::process::Pid;
use snapsend_core::{BackupError, BackupResult, CancelToken, ErrorKind};
use tracing::{debug, warn};

use crate::command::interrupted;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Holds the run lock; releases and unlinks on drop, on every exit path.
#[derive(Debug)]
pub struct LockGuard {
    // Held open for the lifetime of the guard; closing releases the flock.
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// The lock file's path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), %error, "could not remove lock file");
        }
    }
}

/// Acquires the single-writer lock at `path`.
///
/// # Errors
///
/// - [`ErrorKind::LockUnavailable`] when a live process holds the lock, or
///   the lock file is malformed (with a remove-manually suggestion).
/// - [`ErrorKind::Timeout`] when acquisition exceeds its 30 s bound or the
///   cancel token trips.
pub fn acquire(path: &Path, cancel: &CancelToken) -> BackupResult<LockGuard> {
    let deadline = Instant::now() + ACQUIRE_TIMEOUT;

    for attempt in 0..2u32 {
        if cancel.is_cancelled() {
            return Err(interrupted("lock acquisition"));
        }
        if Instant::now() >= deadline {
            return Err(BackupError::new(
                ErrorKind::Timeout,
                format!(
                    "lock acquisition exceeded {}s",
                    ACQUIRE_TIMEOUT.as_secs()
                ),
            )
            .with_path(path));
        }

        match try_create(path) {
            Ok(guard) => {
                debug!(path = %path.display(), "acquired run lock");
                return Ok(guard);
            }
            Err(CreateError::Exists) if attempt == 0 => reclaim_stale(path)?,
            Err(CreateError::Exists) => {
                return Err(BackupError::new(
                    ErrorKind::LockUnavailable,
                    "lock file reappeared while reclaiming a stale lock; another run is starting",
                )
                .with_path(path));
            }
            Err(CreateError::Other(error)) => return Err(error.with_path(path)),
        }
    }

    Err(BackupError::new(
        ErrorKind::LockUnavailable,
        "lock could not be acquired after reclaiming a stale lock file",
    )
    .with_path(path))
}

enum CreateError {
    Exists,
    Other(BackupError),
}

fn try_create(path: &Path) -> Result<LockGuard, CreateError> {
    let fd = rustix::fs::open(
        path,
        OFlags::CREATE | OFlags::EXCL | OFlags::WRONLY | OFlags::CLOEXEC,
        Mode::from_raw_mode(0o600),
    )
    .map_err(|errno| {
        if errno == Errno::EXIST {
            CreateError::Exists
        } else {
            CreateError::Other(
                BackupError::new(
                    ErrorKind::LockUnavailable,
                    format!("cannot create lock file: {errno}"),
                )
                .with_source(std::io::Error::from(errno)),
            )
        }
    })?;

    rustix::fs::flock(&fd, FlockOperation::NonBlockingLockExclusive).map_err(|errno| {
        CreateError::Other(
            BackupError::new(
                ErrorKind::LockUnavailable,
                format!("cannot place advisory lock: {errno}"),
            )
            .with_source(std::io::Error::from(errno)),
        )
    })?;

    let mut file = File::from(fd);
    writeln!(file, "{}", std::process::id()).map_err(|error| {
        CreateError::Other(
            BackupError::new(
                ErrorKind::LockUnavailable,
                format!("cannot record pid in lock file: {error}"),
            )
            .with_source(error),
        )
    })?;

    Ok(LockGuard {
        _file: file,
        path: path.to_path_buf(),
    })
}

/// Removes the lock file when its recorded owner is dead.
///
/// # Errors
///
/// [`ErrorKind::LockUnavailable`] when the owner is alive, the file is
/// malformed, or the stale file cannot be removed.
fn reclaim_stale(path: &Path) -> BackupResult<()> {
    let contents = std::fs::read_to_string(path).map_err(|error| {
        BackupError::new(
            ErrorKind::LockUnavailable,
            format!("existing lock file is unreadable: {error}"),
        )
        .with_path(path)
        .with_suggestion("inspect and remove the lock file manually")
        .with_source(error)
    })?;

    let owner: i32 = contents.trim().parse().map_err(|_| {
        BackupError::new(
            ErrorKind::LockUnavailable,
            "existing lock file does not contain a pid",
        )
        .with_path(path)
        .with_suggestion("remove the malformed lock file manually")
    })?;

    let owner_pid = (owner > 0)
        .then(|| Pid::from_raw(owner))
        .flatten()
        .ok_or_else(|| {
            BackupError::new(
                ErrorKind::LockUnavailable,
                format!("existing lock file names impossible pid {owner}"),
            )
            .with_path(path)
            .with_suggestion("remove the malformed lock file manually")
        })?;

    match rustix::process::test_kill_process(owner_pid) {
        Err(Errno::SRCH) => {
            warn!(owner, path = %path.display(), "reclaiming lock from dead process");
            std::fs::remove_file(path).map_err(|error| {
                BackupError::new(
                    ErrorKind::LockUnavailable,
                    format!("cannot remove stale lock file: {error}"),
                )
                .with_path(path)
                .with_source(error)
            })
        }
        Ok(()) | Err(Errno::PERM) => Err(BackupError::new(
            ErrorKind::LockUnavailable,
            format!("another backup run (pid {owner}) holds the lock"),
        )
        .with_path(path)
        .with_suggestion("wait for the running backup to finish")),
        Err(errno) => Err(BackupError::new(
            ErrorKind::LockUnavailable,
            format!("cannot probe lock owner {owner}: {errno}"),
        )
        .with_path(path)
        .with_source(std::io::Error::from(errno))),
    }
}

#[cfg(test)]
mod tests;
