use super::{cleanup_failed_run, newest_orphan};
use snapsend_core::{ConfigFile, NullObserver};
use std::collections::HashSet;
use std::path::PathBuf;

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn set(values: &[&str]) -> HashSet<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

#[test]
fn the_newest_unpaired_snapshot_is_the_orphan() {
    let source = names(&[
        "data.2025-01-01T00:00:00Z",
        "data.2025-02-01T00:00:00Z",
        "data.2025-03-01T00:00:00Z",
    ]);
    let destination = set(&["data.2025-01-01T00:00:00Z"]);

    assert_eq!(
        newest_orphan(&source, &destination, "data").as_deref(),
        Some("data.2025-03-01T00:00:00Z")
    );
}

#[test]
fn paired_snapshots_are_not_orphans() {
    let source = names(&["data.2025-01-01T00:00:00Z"]);
    let destination = set(&["data.2025-01-01T00:00:00Z"]);
    assert_eq!(newest_orphan(&source, &destination, "data"), None);
}

#[test]
fn foreign_names_are_not_orphans() {
    let source = names(&["data.manual-copy"]);
    assert_eq!(newest_orphan(&source, &HashSet::new(), "data"), None);
}

#[test]
fn cleanup_with_nothing_on_disk_reports_no_failures() {
    let source = tempfile::tempdir().expect("tempdir");
    let dest = tempfile::tempdir().expect("tempdir");
    let config = ConfigFile {
        source_volume: Some(source.path().join("data")),
        snapshot_dir: Some(source.path().join("snapshots")),
        destination_mount: Some(dest.path().to_path_buf()),
        lock_file: Some(PathBuf::from("/tmp/unused.lock")),
        ..ConfigFile::default()
    }
    .into_config()
    .expect("valid config");

    // The snapshot was never created and no orphan exists, so cleanup has
    // nothing to probe and nothing to fail on.
    let failures = cleanup_failed_run(
        &config,
        "data.2025-03-01T00:00:00Z",
        false,
        &NullObserver,
    );
    assert!(failures.is_empty());

    let failures = cleanup_failed_run(
        &config,
        "data.2025-03-01T00:00:00Z",
        true,
        &NullObserver,
    );
    assert!(failures.is_empty());
}
