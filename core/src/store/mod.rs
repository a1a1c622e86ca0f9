//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The recorder and the query projection call store methods; they never
//! execute SQL directly.

use crate::error::SamplerResult;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{
    types::Type, Connection, OpenFlags, Row, TransactionBehavior,
};

mod batch_log;
mod selection;

pub use batch_log::BatchLog;
pub use selection::SelectionEntry;

pub struct SelectionStore {
    conn: Connection,
    path: Option<String>, // None for a private :memory: database
}

impl SelectionStore {
    /// Open (or create) the database at `path`. URIs are accepted, so
    /// `file:name?mode=memory&cache=shared` gives a shared in-memory db.
    pub fn open(path: &str) -> SamplerResult<Self> {
        if path == ":memory:" {
            return Self::in_memory();
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an existing database for reading only. Never creates a file.
    pub fn open_read_only(path: &str) -> SamplerResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open a private in-memory database (used in tests).
    pub fn in_memory() -> SamplerResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SamplerResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Run `f` inside one IMMEDIATE transaction.
    ///
    /// The write lock is taken at BEGIN, so reads made through the
    /// handle cannot be invalidated by another writer before commit.
    /// Returning Err rolls everything back.
    pub fn write_txn<T, F>(&mut self, f: F) -> SamplerResult<T>
    where
        F: FnOnce(&StoreTxn<'_>) -> SamplerResult<T>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&StoreTxn { conn: &tx })?;
        tx.commit()?;
        Ok(out)
    }
}

/// Store operations scoped to an open write transaction.
pub struct StoreTxn<'a> {
    conn: &'a Connection,
}

// ── Column codecs ──────────────────────────────────────────────

pub(crate) fn encode_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

pub(crate) fn get_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| conversion_error(idx, format!("bad date '{raw}': {e}")))
}

pub(crate) fn get_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp '{raw}': {e}")))
}

pub(crate) fn get_parsed<T>(
    row: &Row<'_>,
    idx: usize,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| conversion_error(idx, format!("unexpected value '{raw}'")))
}
