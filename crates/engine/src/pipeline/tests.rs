use super::{
    Stage, first_failure, is_receive_noise, parse_meter_bytes, progress_update, reconcile,
};
use snapsend_core::{BackupError, BackupResult, CancelToken, ErrorKind};
use std::time::Duration;

type StageWaits = [(Stage, BackupResult<i32>); 3];

fn no_stderr() -> [Vec<u8>; 3] {
    [Vec::new(), Vec::new(), Vec::new()]
}

#[test]
fn all_clean_exits_mean_no_failure() {
    assert!(first_failure([0, 0, 0], &no_stderr()).is_none());
}

#[test]
fn the_first_failing_stage_in_pipeline_order_is_blamed() {
    // Receive died; send saw a broken pipe. Receive exits later in the
    // array but send comes first in pipeline order, so a genuine send
    // failure wins; with send clean, receive gets the blame even though
    // the meter also died of the cascade.
    let captured = [
        b"ERROR: send failed".to_vec(),
        Vec::new(),
        b"ERROR: destination full".to_vec(),
    ];

    let send_first = first_failure([1, 141, 1], &captured).expect("failure");
    assert!(send_first.message().contains("send stage"));
    assert_eq!(send_first.context().exit_code(), Some(1));
    assert!(
        send_first
            .context()
            .stderr()
            .is_some_and(|s| s.contains("send failed"))
    );

    let receive_blamed = first_failure([0, 0, 1], &captured).expect("failure");
    assert!(receive_blamed.message().contains("receive stage"));
    assert!(
        receive_blamed
            .context()
            .stderr()
            .is_some_and(|s| s.contains("destination full"))
    );
}

#[test]
fn meter_failure_outranks_receive_failure() {
    let error = first_failure([0, 2, 1], &no_stderr()).expect("failure");
    assert!(error.message().contains("meter stage"));
    assert_eq!(error.kind(), ErrorKind::StreamFailed);
}

#[test]
fn reconcile_prefers_cancellation_over_stage_blame() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let outcome: StageWaits = [
        (Stage::Send, Ok(1)),
        (Stage::Meter, Ok(141)),
        (Stage::Receive, Ok(137)),
    ];
    let error = reconcile(&outcome, &no_stderr(), &cancel).expect("failure");
    assert_eq!(error.kind(), ErrorKind::Timeout);
    assert!(error.message().contains("cancellation"));
}

#[test]
fn reconcile_reports_a_hung_stage_with_its_stderr() {
    let outcome: StageWaits = [
        (Stage::Send, Ok(0)),
        (Stage::Meter, Ok(0)),
        (
            Stage::Receive,
            Err(BackupError::new(
                ErrorKind::Timeout,
                "receive did not finish within 300s",
            )),
        ),
    ];
    let captured = [Vec::new(), Vec::new(), b"At subvol data".to_vec()];
    let error = reconcile(&outcome, &captured, &CancelToken::new()).expect("failure");
    assert_eq!(error.kind(), ErrorKind::Timeout);
    assert!(error.message().contains("receive stage"));
    assert!(error.context().stderr().is_some_and(|s| s.contains("At subvol")));
}

#[test]
fn receive_write_chatter_is_noise() {
    assert!(is_receive_noise(
        "write data.2025-01-01T00:00:00Z/var/log/syslog offset=1048576"
    ));
    assert!(!is_receive_noise("At subvol data.2025-01-01T00:00:00Z"));
    assert!(!is_receive_noise("ERROR: writing to stream failed"));
    // Both tokens are required, in order.
    assert!(!is_receive_noise("offset= without a write"));
}

#[test]
fn meter_lines_parse_as_plain_byte_counts() {
    assert_eq!(parse_meter_bytes(" 1048576\n".trim()), Some(1_048_576));
    assert_eq!(parse_meter_bytes("0"), Some(0));
    assert_eq!(parse_meter_bytes("12:34"), None);
    assert_eq!(parse_meter_bytes(""), None);
}

#[test]
fn progress_samples_derive_throughput_and_eta() {
    let update = progress_update(50, 100, Duration::from_secs(5));
    assert_eq!(update.bytes_transferred, 50);
    assert_eq!(update.total_estimated, 100);
    assert_eq!(update.throughput, 10);
    assert_eq!(update.eta, Some(Duration::from_secs(5)));
}

#[test]
fn progress_withholds_eta_without_throughput_or_past_the_estimate() {
    let stalled = progress_update(0, 100, Duration::from_secs(5));
    assert_eq!(stalled.throughput, 0);
    assert_eq!(stalled.eta, None);

    let overshot = progress_update(200, 100, Duration::from_secs(5));
    assert_eq!(overshot.eta, None);
}
