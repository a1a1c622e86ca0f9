//! Selection store tests: membership, atomic inserts, duplicate guard.

use chrono::{NaiveDate, TimeZone, Utc};
use policy_sampler_core::{
    error::SamplerError,
    store::{BatchLog, SelectionEntry, SelectionStore},
    types::{PoolType, RunStatus},
};

fn store() -> SelectionStore {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = SelectionStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

fn entry(policy_id: &str, batch_id: &str) -> SelectionEntry {
    SelectionEntry {
        policy_id:    policy_id.into(),
        batch_id:     batch_id.into(),
        log_id:       None,
        receive_date: NaiveDate::from_ymd_opt(2025, 4, 20).unwrap(),
        advisor_id:   "ADV001".into(),
        branch_name:  "Pine Plaza".into(),
        flagged:      true,
        selected_at:  Utc.with_ymd_and_hms(2025, 5, 4, 14, 0, 0).unwrap(),
    }
}

fn log_row(batch_id: &str) -> BatchLog {
    BatchLog {
        log_id:          None,
        batch_id:        batch_id.into(),
        status:          RunStatus::Success,
        message:         "Selected 1".into(),
        submitted_count: 10,
        rejected_count:  1,
        eligible_count:  9,
        pool_type:       Some(PoolType::Total),
        selected_count:  1,
        target_rate:     0.01,
        min_count:       1,
        seed:            u64::MAX,
        logged_at:       Utc.with_ymd_and_hms(2025, 5, 4, 14, 0, 0).unwrap(),
    }
}

#[test]
fn recorded_entries_are_immediately_visible() {
    let mut store = store();
    assert!(!store.is_selected("P1").unwrap());

    store.record(&[entry("P1", "B1"), entry("P2", "B1")]).unwrap();

    assert!(store.is_selected("P1").unwrap());
    assert!(store.is_selected("P2").unwrap());
    assert!(!store.is_selected("P3").unwrap());

    let excluded = store.exclusion_set(["P1", "P3", "P2", "P4"]).unwrap();
    assert_eq!(excluded.len(), 2);
    assert!(excluded.contains("P1") && excluded.contains("P2"));
}

#[test]
fn entries_round_trip_through_storage() {
    let mut store = store();
    let original = entry("P1", "B1");
    store.record(std::slice::from_ref(&original)).unwrap();

    let stored = store.selections_for_batch("B1").unwrap();
    assert_eq!(stored, vec![original]);
}

#[test]
fn duplicate_against_history_writes_nothing() {
    let mut store = store();
    store.record(&[entry("P1", "B1")]).unwrap();

    let err = store
        .record(&[entry("P2", "B2"), entry("P1", "B2")])
        .unwrap_err();
    assert!(
        matches!(&err, SamplerError::DuplicatePolicyId { policy_id } if policy_id == "P1"),
        "unexpected error: {err}"
    );

    // P2 must not have leaked in.
    assert!(!store.is_selected("P2").unwrap());
    assert!(store.selections_for_batch("B2").unwrap().is_empty());
    assert_eq!(store.selected_count().unwrap(), 1);
}

#[test]
fn duplicate_within_one_call_is_rejected() {
    let mut store = store();
    let err = store.record(&[entry("P9", "B1"), entry("P9", "B1")]).unwrap_err();
    assert!(matches!(err, SamplerError::DuplicatePolicyId { .. }));
    assert_eq!(store.selected_count().unwrap(), 0);
}

#[test]
fn logs_list_most_recent_first() {
    let mut store = store();
    let first = store.append_log(&log_row("B1")).unwrap();
    let second = store.append_log(&log_row("B2")).unwrap();
    assert!(second.log_id > first.log_id);

    let logs = store.list_logs().unwrap();
    let batches: Vec<&str> = logs.iter().map(|l| l.batch_id.as_str()).collect();
    assert_eq!(batches, ["B2", "B1"]);
    assert_eq!(logs[1], first);
}

#[test]
fn failure_log_without_pool_round_trips() {
    let mut store = store();
    let mut failure = log_row("B1");
    failure.status = RunStatus::Failure;
    failure.pool_type = None;
    failure.selected_count = 0;

    let written = store.append_log(&failure).unwrap();
    let read = store.logs_for_batch("B1").unwrap();
    assert_eq!(read, vec![written]);
    assert!(!read[0].is_success());
}

#[test]
fn transaction_error_rolls_back_every_write() {
    let mut store = store();
    let result: Result<(), SamplerError> = store.write_txn(|txn| {
        let log = txn.append_log(&log_row("B1"))?;
        txn.record(&[entry("P1", "B1")], log.log_id)?;
        txn.record(&[entry("P1", "B1")], log.log_id)
    });
    assert!(matches!(result, Err(SamplerError::DuplicatePolicyId { .. })));

    assert!(store.list_logs().unwrap().is_empty());
    assert!(!store.is_selected("P1").unwrap());
}

#[test]
fn file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sampler.db");
    let path = path.to_str().unwrap();

    {
        let mut store = SelectionStore::open(path).unwrap();
        store.migrate().unwrap();
        store.record(&[entry("P1", "B1")]).unwrap();
    }

    let reader = SelectionStore::open_read_only(path).unwrap();
    assert!(reader.is_selected("P1").unwrap());
    assert_eq!(reader.all_selections().unwrap().len(), 1);
}

#[test]
fn read_only_open_of_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.db");
    let result = SelectionStore::open_read_only(path.to_str().unwrap());
    assert!(matches!(result, Err(SamplerError::StorageUnavailable(_))));
}
