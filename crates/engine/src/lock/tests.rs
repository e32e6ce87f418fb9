use super::acquire;
use snapsend_core::{CancelToken, ErrorKind};
use std::path::PathBuf;

fn lock_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("snapsend.lock")
}

#[test]
fn acquire_writes_pid_and_release_removes_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = lock_path(&dir);

    {
        let guard = acquire(&path, &CancelToken::new()).expect("acquire");
        assert_eq!(guard.path(), path);
        let contents = std::fs::read_to_string(&path).expect("lock readable");
        assert_eq!(
            contents.trim().parse::<u32>().expect("pid"),
            std::process::id()
        );
    }

    assert!(!path.exists(), "lock file removed on release");
}

#[test]
fn second_acquisition_fails_while_the_owner_lives() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = lock_path(&dir);

    let _guard = acquire(&path, &CancelToken::new()).expect("first acquire");
    let error = acquire(&path, &CancelToken::new()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::LockUnavailable);
    assert!(error.message().contains(&std::process::id().to_string()));
}

#[test]
fn stale_lock_from_a_dead_process_is_reclaimed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = lock_path(&dir);

    // A pid beyond the kernel's default pid_max cannot name a live process.
    std::fs::write(&path, "2147480000\n").expect("seed stale lock");

    let guard = acquire(&path, &CancelToken::new()).expect("reclaims stale lock");
    drop(guard);
    assert!(!path.exists());
}

#[test]
fn malformed_lock_file_is_fatal_with_a_suggestion() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = lock_path(&dir);

    std::fs::write(&path, "not-a-pid\n").expect("seed garbage lock");

    let error = acquire(&path, &CancelToken::new()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::LockUnavailable);
    assert!(
        error
            .context()
            .suggestion()
            .is_some_and(|s| s.contains("manually"))
    );
    assert!(path.exists(), "malformed lock file is left in place");
}

#[test]
fn negative_pid_in_lock_file_is_malformed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = lock_path(&dir);

    std::fs::write(&path, "-5\n").expect("seed lock");

    let error = acquire(&path, &CancelToken::new()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::LockUnavailable);
}

#[test]
fn cancelled_token_stops_acquisition() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cancel = CancelToken::new();
    cancel.cancel();

    let error = acquire(&lock_path(&dir), &cancel).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Timeout);
}

#[test]
fn exactly_one_of_two_concurrent_acquisitions_wins() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = lock_path(&dir);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let path = path.clone();
                scope.spawn(move || acquire(&path, &CancelToken::new()).map(|guard| {
                    // Hold long enough for the loser to observe the lock.
                    std::thread::sleep(std::time::Duration::from_millis(200));
                    guard
                }))
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("no panic")).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one concurrent acquisition succeeds");
    let loser = results.iter().find(|r| r.is_err()).expect("one loser");
    assert!(matches!(
        loser.as_ref().unwrap_err().kind(),
        ErrorKind::LockUnavailable | ErrorKind::Timeout
    ));
}
