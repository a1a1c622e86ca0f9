//! Store methods for selected applications.
//!
//! A policy_id is written here at most once, ever. Every path into
//! the table goes through `record_in`, which checks for repeats before
//! inserting and maps a primary-key collision to DuplicatePolicyId.

use super::{encode_date, encode_timestamp, get_date, get_timestamp, SelectionStore, StoreTxn};
use crate::{
    error::{SamplerError, SamplerResult},
    types::{BatchId, CandidateRecord, PolicyId},
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Row from the `selected_application` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub policy_id:    PolicyId,
    pub batch_id:     BatchId,
    /// Log row of the run that made the selection. None only for
    /// entries recorded outside a batch run.
    pub log_id:       Option<i64>,
    pub receive_date: NaiveDate,
    pub advisor_id:   String,
    pub branch_name:  String,
    pub flagged:      bool,
    pub selected_at:  DateTime<Utc>,
}

impl SelectionEntry {
    pub fn from_candidate(
        record: &CandidateRecord,
        batch_id: &str,
        selected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            policy_id:    record.policy_id.clone(),
            batch_id:     batch_id.to_string(),
            log_id:       None,
            receive_date: record.receive_date,
            advisor_id:   record.advisor_id.clone(),
            branch_name:  record.branch_name.clone(),
            flagged:      record.flagged,
            selected_at,
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            policy_id:    row.get(0)?,
            batch_id:     row.get(1)?,
            log_id:       row.get(2)?,
            receive_date: get_date(row, 3)?,
            advisor_id:   row.get(4)?,
            branch_name:  row.get(5)?,
            flagged:      row.get::<_, i64>(6)? != 0,
            selected_at:  get_timestamp(row, 7)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT policy_id, batch_id, log_id, receive_date, advisor_id,
                                     branch_name, flagged, selected_at
                              FROM selected_application";

impl SelectionStore {
    /// Has this policy ever been selected, in any batch?
    pub fn is_selected(&self, policy_id: &str) -> SamplerResult<bool> {
        is_selected_in(&self.conn, policy_id)
    }

    /// The subset of `policy_ids` already selected in a prior batch.
    pub fn exclusion_set<'a, I>(&self, policy_ids: I) -> SamplerResult<HashSet<PolicyId>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        exclusion_set_in(&self.conn, policy_ids)
    }

    /// Insert entries atomically. Nothing is written if any policy_id
    /// is already present or repeats within `entries`.
    pub fn record(&mut self, entries: &[SelectionEntry]) -> SamplerResult<()> {
        self.write_txn(|txn| txn.record(entries, None))
    }

    /// Entries selected under `batch_id`, ordered by policy_id.
    pub fn selections_for_batch(&self, batch_id: &str) -> SamplerResult<Vec<SelectionEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE batch_id = ?1 ORDER BY policy_id ASC"
        ))?;
        let entries = stmt
            .query_map(params![batch_id], SelectionEntry::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Every entry ever selected, most recent first.
    pub fn all_selections(&self) -> SamplerResult<Vec<SelectionEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} ORDER BY selected_at DESC, policy_id ASC"
        ))?;
        let entries = stmt
            .query_map([], SelectionEntry::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn selected_count(&self) -> SamplerResult<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM selected_application", [], |row| row.get(0))?;
        Ok(n)
    }
}

impl StoreTxn<'_> {
    pub fn is_selected(&self, policy_id: &str) -> SamplerResult<bool> {
        is_selected_in(self.conn, policy_id)
    }

    pub fn exclusion_set<'a, I>(&self, policy_ids: I) -> SamplerResult<HashSet<PolicyId>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        exclusion_set_in(self.conn, policy_ids)
    }

    /// Insert entries, stamping each with `log_id` when given.
    pub fn record(&self, entries: &[SelectionEntry], log_id: Option<i64>) -> SamplerResult<()> {
        record_in(self.conn, entries, log_id)
    }
}

fn is_selected_in(conn: &Connection, policy_id: &str) -> SamplerResult<bool> {
    let found = conn
        .prepare_cached("SELECT 1 FROM selected_application WHERE policy_id = ?1")?
        .query_row(params![policy_id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn exclusion_set_in<'a, I>(conn: &Connection, policy_ids: I) -> SamplerResult<HashSet<PolicyId>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut stmt = conn.prepare_cached("SELECT 1 FROM selected_application WHERE policy_id = ?1")?;
    let mut excluded = HashSet::new();
    for id in policy_ids {
        if stmt.exists(params![id])? {
            excluded.insert(id.to_string());
        }
    }
    Ok(excluded)
}

fn record_in(conn: &Connection, entries: &[SelectionEntry], log_id: Option<i64>) -> SamplerResult<()> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.policy_id.as_str()) || is_selected_in(conn, &entry.policy_id)? {
            return Err(SamplerError::DuplicatePolicyId {
                policy_id: entry.policy_id.clone(),
            });
        }
    }

    for entry in entries {
        insert_entry(conn, entry, log_id.or(entry.log_id))?;
    }
    Ok(())
}

/// Plain insert with no pre-check. The primary key still rejects a
/// policy_id written by another connection after `record_in` looked.
fn insert_entry(conn: &Connection, entry: &SelectionEntry, log_id: Option<i64>) -> SamplerResult<()> {
    conn.prepare_cached(
        "INSERT INTO selected_application
         (policy_id, log_id, batch_id, receive_date, advisor_id, branch_name, flagged, selected_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?
    .execute(params![
        entry.policy_id,
        log_id,
        entry.batch_id,
        encode_date(entry.receive_date),
        entry.advisor_id,
        entry.branch_name,
        entry.flagged as i64,
        encode_timestamp(entry.selected_at),
    ])
    .map_err(|e| duplicate_or_storage(e, &entry.policy_id))?;
    Ok(())
}

/// A key collision on insert means another writer got there first.
fn duplicate_or_storage(err: rusqlite::Error, policy_id: &str) -> SamplerError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            SamplerError::DuplicatePolicyId {
                policy_id: policy_id.to_string(),
            }
        }
        _ => SamplerError::StorageUnavailable(err),
    }
}
