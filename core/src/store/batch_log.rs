//! Store methods for the append-only batch log.

use super::{encode_timestamp, get_parsed, get_timestamp, SelectionStore, StoreTxn};
use crate::{
    error::SamplerResult,
    types::{BatchId, PoolType, RunStatus},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

/// Row from the `batch_log` table. One per run, success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchLog {
    /// None until the row is written.
    pub log_id:          Option<i64>,
    pub batch_id:        BatchId,
    pub status:          RunStatus,
    pub message:         String,
    pub submitted_count: u64,
    pub rejected_count:  u64,
    pub eligible_count:  u64,
    /// None when the run failed before a pool was chosen.
    pub pool_type:       Option<PoolType>,
    pub selected_count:  u64,
    pub target_rate:     f64,
    pub min_count:       i64,
    pub seed:            u64,
    pub logged_at:       DateTime<Utc>,
}

impl BatchLog {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            log_id:          Some(row.get(0)?),
            batch_id:        row.get(1)?,
            status:          get_parsed(row, 2, RunStatus::parse)?,
            message:         row.get(3)?,
            submitted_count: row.get::<_, i64>(4)? as u64,
            rejected_count:  row.get::<_, i64>(5)? as u64,
            eligible_count:  row.get::<_, i64>(6)? as u64,
            pool_type:       match row.get::<_, Option<String>>(7)? {
                Some(_) => Some(get_parsed(row, 7, PoolType::parse)?),
                None => None,
            },
            selected_count:  row.get::<_, i64>(8)? as u64,
            target_rate:     row.get(9)?,
            min_count:       row.get(10)?,
            seed:            row.get::<_, i64>(11)? as u64,
            logged_at:       get_timestamp(row, 12)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT log_id, batch_id, status, message, submitted_count,
                                     rejected_count, eligible_count, pool_type, selected_count,
                                     target_rate, min_count, seed, logged_at
                              FROM batch_log";

impl SelectionStore {
    /// Append a log row on its own. Returns the row with `log_id` set.
    pub fn append_log(&mut self, log: &BatchLog) -> SamplerResult<BatchLog> {
        self.write_txn(|txn| txn.append_log(log))
    }

    /// Every log row, most recent first.
    pub fn list_logs(&self) -> SamplerResult<Vec<BatchLog>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY log_id DESC"))?;
        let logs = stmt
            .query_map([], BatchLog::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    /// Log rows recorded under `batch_id`, most recent first.
    pub fn logs_for_batch(&self, batch_id: &str) -> SamplerResult<Vec<BatchLog>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE batch_id = ?1 ORDER BY log_id DESC"
        ))?;
        let logs = stmt
            .query_map(params![batch_id], BatchLog::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }
}

impl StoreTxn<'_> {
    pub fn append_log(&self, log: &BatchLog) -> SamplerResult<BatchLog> {
        append_log_in(self.conn, log)
    }

    /// How many runs have already used `batch_id`.
    pub fn batch_id_uses(&self, batch_id: &str) -> SamplerResult<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM batch_log WHERE batch_id = ?1",
            params![batch_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

fn append_log_in(conn: &Connection, log: &BatchLog) -> SamplerResult<BatchLog> {
    conn.execute(
        "INSERT INTO batch_log
         (batch_id, status, message, submitted_count, rejected_count, eligible_count,
          pool_type, selected_count, target_rate, min_count, seed, logged_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            log.batch_id,
            log.status.as_str(),
            log.message,
            log.submitted_count as i64,
            log.rejected_count as i64,
            log.eligible_count as i64,
            log.pool_type.map(|p| p.as_str()),
            log.selected_count as i64,
            log.target_rate,
            log.min_count,
            log.seed as i64,
            encode_timestamp(log.logged_at),
        ],
    )?;
    let mut written = log.clone();
    written.log_id = Some(conn.last_insert_rowid());
    Ok(written)
}
