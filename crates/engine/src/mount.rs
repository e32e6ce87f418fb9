//! Mount-point verification.
//!
//! The engine refuses to run against an unmounted side; it never mounts
//! anything itself. The check is retried a couple of times because
//! automounters can briefly report a path as not-yet-mounted while they
//! bring it up.

use std::path::Path;
use std::time::Duration;

use snapsend_core::{BackupError, BackupResult, CancelToken, ErrorKind};
use tracing::warn;

use crate::command::{ToolInvocation, cancellable_pause};

const MOUNT_CHECK_ATTEMPTS: u32 = 3;
const MOUNT_CHECK_PAUSE: Duration = Duration::from_secs(2);
const MOUNT_CHECK_DEADLINE: Duration = Duration::from_secs(30);

/// Confirms that `path` is a mount point.
///
/// # Errors
///
/// [`ErrorKind::MountMissing`] when the final attempt still reports the
/// path as not mounted; runner errors (missing tool, cancellation) pass
/// through unchanged.
pub fn ensure_mounted(path: &Path, cancel: &CancelToken) -> BackupResult<()> {
    for attempt in 1..=MOUNT_CHECK_ATTEMPTS {
        let output = ToolInvocation::new("mountpoint")
            .arg("-q")
            .path_arg(path)
            .run_unchecked(MOUNT_CHECK_DEADLINE, cancel)?;
        if output.success() {
            return Ok(());
        }
        if attempt < MOUNT_CHECK_ATTEMPTS {
            warn!(path = %path.display(), attempt, "mount check failed, retrying");
            cancellable_pause(MOUNT_CHECK_PAUSE, cancel, "mount check")?;
        }
    }

    Err(BackupError::new(
        ErrorKind::MountMissing,
        format!("{} is not a mount point", path.display()),
    )
    .with_path(path)
    .with_suggestion(format!("mount the filesystem at {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::ensure_mounted;
    use snapsend_core::{CancelToken, ErrorKind};
    use std::path::Path;

    #[test]
    fn the_root_filesystem_is_a_mount_point() {
        ensure_mounted(Path::new("/"), &CancelToken::new()).expect("/ is mounted");
    }

    #[test]
    fn an_ordinary_directory_is_not() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = ensure_mounted(dir.path(), &CancelToken::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MountMissing);
        assert!(error.context().suggestion().is_some());
    }
}
