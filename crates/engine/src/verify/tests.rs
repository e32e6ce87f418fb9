use super::check_identity;
use crate::subvolume::{ReceivedUuid, SubvolumeInfo, SubvolumeUuid};
use snapsend_core::ErrorKind;
use std::path::Path;

const SOURCE_UUID: &str = "751c1d2a-8090-4f4d-9e2b-3f8d0a11c5e7";
const OTHER_UUID: &str = "0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9";
const DEST_OWN_UUID: &str = "9cf2a17b-12ab-43cd-8ef0-0123456789ab";

fn source_info(uuid: &str, received: Option<&str>) -> SubvolumeInfo {
    SubvolumeInfo {
        uuid: SubvolumeUuid::parse(uuid).expect("valid uuid"),
        received_uuid: received.map(|value| ReceivedUuid::parse(value).expect("valid uuid")),
        total_bytes: Some(1_073_741_824),
    }
}

fn destination_info(received: Option<&str>) -> SubvolumeInfo {
    // A received snapshot always has its own fresh UUID; only the
    // recorded received UUID ties it back to the source.
    source_info(DEST_OWN_UUID, received)
}

fn check(source: &SubvolumeInfo, destination: &SubvolumeInfo) -> Result<(), snapsend_core::BackupError> {
    check_identity(
        source,
        destination,
        Path::new("/data/.snapshots/data.2025-03-01T04:00:00Z"),
        Path::new("/mnt/backup/data.2025-03-01T04:00:00Z"),
        Path::new("/mnt/backup"),
        "transferred snapshot",
    )
}

#[test]
fn a_matching_pair_passes() {
    let source = source_info(SOURCE_UUID, None);
    let destination = destination_info(Some(SOURCE_UUID));
    check(&source, &destination).expect("identities match");
}

#[test]
fn a_source_snapshot_with_a_received_uuid_is_rejected() {
    let source = source_info(SOURCE_UUID, Some(OTHER_UUID));
    let destination = destination_info(Some(SOURCE_UUID));

    let error = check(&source, &destination).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::IdentifierMismatch);
    assert!(error.message().contains("source"));
    assert!(error.message().contains(OTHER_UUID));
}

#[test]
fn a_destination_without_a_received_uuid_is_rejected() {
    let source = source_info(SOURCE_UUID, None);
    let destination = destination_info(None);

    let error = check(&source, &destination).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::IdentifierMismatch);
    // The report names the value the destination should have recorded.
    assert!(error.message().contains(SOURCE_UUID));
    assert!(
        error
            .context()
            .suggestion()
            .is_some_and(|s| s.contains("btrfs scrub start /mnt/backup"))
    );
}

#[test]
fn mismatched_identifiers_report_both_values() {
    let source = source_info(SOURCE_UUID, None);
    let destination = destination_info(Some(OTHER_UUID));

    let error = check(&source, &destination).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::IdentifierMismatch);
    assert!(error.message().contains(SOURCE_UUID));
    assert!(error.message().contains(OTHER_UUID));
    assert_eq!(error.context().paths().len(), 2);
}

#[test]
fn the_destination_own_uuid_never_satisfies_verification() {
    // The destination's own UUID differing from the source is normal; a
    // comparison against it instead of the received UUID would pass
    // everything. Make sure the rule keys on the received UUID alone.
    let source = source_info(SOURCE_UUID, None);
    let destination = destination_info(Some(DEST_OWN_UUID));

    let error = check(&source, &destination).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::IdentifierMismatch);
}
