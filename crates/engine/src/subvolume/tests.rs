use super::{ReceivedUuid, SubvolumeUuid, parse_show_output};
use snapsend_core::ErrorKind;

const SOURCE_SHOW: &str = "\
data.2025-03-01T04:00:00Z
\tName: \t\t\tdata.2025-03-01T04:00:00Z
\tUUID: \t\t\t751c1d2a-8090-4f4d-9e2b-3f8d0a11c5e7
\tParent UUID: \t\t9cf2a17b-12ab-43cd-8ef0-0123456789ab
\tReceived UUID: \t\t-
\tCreation time: \t\t2025-03-01 04:00:00 +0000
\tFlags: \t\t\treadonly
\tTotal bytes: \t\t1073741824
";

const RECEIVED_SHOW: &str = "\
data.2025-03-01T04:00:00Z
\tUUID: \t\t\t0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9
\tParent UUID: \t\t-
\tReceived UUID: \t\t751c1d2a-8090-4f4d-9e2b-3f8d0a11c5e7
\tFlags: \t\t\treadonly
";

#[test]
fn own_uuid_comes_from_the_first_uuid_line_only() {
    let info = parse_show_output(SOURCE_SHOW).expect("parses");
    assert_eq!(
        info.uuid.as_str(),
        "751c1d2a-8090-4f4d-9e2b-3f8d0a11c5e7"
    );
    assert!(info.received_uuid.is_none());
    assert_eq!(info.total_bytes, Some(1_073_741_824));
}

#[test]
fn received_uuid_never_matches_the_own_uuid_pattern() {
    let info = parse_show_output(RECEIVED_SHOW).expect("parses");
    assert_eq!(
        info.uuid.as_str(),
        "0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9"
    );
    let received = info.received_uuid.expect("received uuid present");
    assert_eq!(received.as_str(), "751c1d2a-8090-4f4d-9e2b-3f8d0a11c5e7");
}

#[test]
fn received_uuid_confirms_the_matching_source_uuid() {
    let source = SubvolumeUuid::parse("751c1d2a-8090-4f4d-9e2b-3f8d0a11c5e7").unwrap();
    let other = SubvolumeUuid::parse("0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9").unwrap();
    let received = ReceivedUuid::parse("751c1d2a-8090-4f4d-9e2b-3f8d0a11c5e7").unwrap();

    assert!(received.confirms(&source));
    assert!(!received.confirms(&other));
}

#[test]
fn dash_means_no_received_uuid() {
    let info = parse_show_output(SOURCE_SHOW).expect("parses");
    assert!(info.received_uuid.is_none());
}

#[test]
fn missing_uuid_line_is_an_error() {
    let error = parse_show_output("Name: data\nFlags: readonly\n").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::SnapshotOperationFailed);
}

#[test]
fn malformed_uuid_values_are_rejected() {
    assert_eq!(
        SubvolumeUuid::parse("not-a-uuid").unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
    assert_eq!(
        SubvolumeUuid::parse("751c1d2a-8090-4f4d-9e2b-3f8d0a11c5eZ")
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidInput
    );
    assert!(SubvolumeUuid::parse("751c1d2a-8090-4f4d-9e2b-3f8d0a11c5e7").is_ok());
}

#[test]
fn parse_ignores_unrelated_key_lookalikes() {
    let text = "\
\tUUID Tree: \t\t5
\tUUID: \t\t\t751c1d2a-8090-4f4d-9e2b-3f8d0a11c5e7
";
    let info = parse_show_output(text).expect("parses");
    assert_eq!(info.uuid.as_str(), "751c1d2a-8090-4f4d-9e2b-3f8d0a11c5e7");
}
