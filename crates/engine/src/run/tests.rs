use super::run_backup;
use crate::lock;
use snapsend_core::{BackupConfig, CancelToken, ConfigFile, ErrorKind, NullObserver};
use std::path::Path;

fn test_config(root: &Path) -> BackupConfig {
    std::fs::create_dir_all(root.join("data")).expect("source dir");
    std::fs::create_dir_all(root.join("dest")).expect("dest dir");
    ConfigFile {
        source_volume: Some(root.join("data")),
        snapshot_dir: Some(root.join("snapshots")),
        destination_mount: Some(root.join("dest")),
        lock_file: Some(root.join("run.lock")),
        ..ConfigFile::default()
    }
    .into_config()
    .expect("valid config")
}

#[test]
fn an_unmounted_source_fails_with_no_side_effects() {
    let root = tempfile::tempdir().expect("tempdir");
    let config = test_config(root.path());

    let error = run_backup(&config, &NullObserver, &CancelToken::new()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::MountMissing);

    // The failure predates any snapshot work, so nothing was created and
    // nothing needed cleanup.
    assert!(error.suppressed().is_empty());
    assert!(!config.snapshot_dir.exists());
    assert!(!config.lock_file.exists(), "lock released on the error path");
}

#[test]
fn a_held_lock_refuses_a_second_run() {
    let root = tempfile::tempdir().expect("tempdir");
    let config = test_config(root.path());

    let _guard = lock::acquire(&config.lock_file, &CancelToken::new()).expect("hold lock");
    let error = run_backup(&config, &NullObserver, &CancelToken::new()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::LockUnavailable);
}

#[test]
fn a_pre_tripped_token_stops_the_run_at_the_lock() {
    let root = tempfile::tempdir().expect("tempdir");
    let config = test_config(root.path());

    let cancel = CancelToken::new();
    cancel.cancel();
    let error = run_backup(&config, &NullObserver, &cancel).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Timeout);
    assert!(!config.lock_file.exists());
}
