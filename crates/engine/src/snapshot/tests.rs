use super::{list_snapshots, mint_snapshot_name, parse_snapshot_timestamp};
use proptest::prelude::*;
use time::OffsetDateTime;

fn utc(unix: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(unix).expect("valid timestamp")
}

#[test]
fn minted_names_use_rfc3339_at_second_precision() {
    // 2025-03-01T04:05:06Z
    let name = mint_snapshot_name("data", utc(1_740_801_906)).expect("mint");
    assert_eq!(name, "data.2025-03-01T04:05:06Z");
}

#[test]
fn minted_names_round_trip_through_the_parser() {
    let now = utc(1_740_801_906);
    let name = mint_snapshot_name("data", now).expect("mint");
    assert_eq!(parse_snapshot_timestamp(&name, "data"), Some(now));
}

#[test]
fn parser_rejects_foreign_names() {
    assert!(parse_snapshot_timestamp("data.not-a-date", "data").is_none());
    assert!(parse_snapshot_timestamp("other.2025-03-01T04:05:06Z", "data").is_none());
    assert!(parse_snapshot_timestamp("data", "data").is_none());
}

#[test]
fn list_snapshots_filters_by_prefix_and_reads_missing_dirs_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    for name in [
        "data.2025-01-01T00:00:00Z",
        "data.2025-02-01T00:00:00Z",
        "other.2025-01-01T00:00:00Z",
        "data-old.2025-01-01T00:00:00Z",
    ] {
        std::fs::create_dir(dir.path().join(name)).expect("mkdir");
    }
    std::fs::write(dir.path().join("data.2025-03-01T00:00:00Z"), b"not a dir").expect("file");

    let mut names = list_snapshots(dir.path(), "data").expect("list");
    names.sort();
    assert_eq!(
        names,
        vec![
            "data.2025-01-01T00:00:00Z".to_string(),
            "data.2025-02-01T00:00:00Z".to_string(),
        ]
    );

    let empty = list_snapshots(&dir.path().join("absent"), "data").expect("missing dir");
    assert!(empty.is_empty());
}

proptest! {
    // The textual timestamp must order exactly like the instant it encodes;
    // parent selection and pruning both lean on this.
    #[test]
    fn name_ordering_matches_time_ordering(
        a in 0i64..=4_000_000_000,
        b in 0i64..=4_000_000_000,
    ) {
        let name_a = mint_snapshot_name("data", utc(a)).expect("mint");
        let name_b = mint_snapshot_name("data", utc(b)).expect("mint");
        prop_assert_eq!(a.cmp(&b), name_a.cmp(&name_b));
    }
}
