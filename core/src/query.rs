//! Read-only projection over stored logs and selections.

use crate::{
    config::SamplerConfig,
    error::SamplerResult,
    store::{BatchLog, SelectionEntry, SelectionStore},
};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Health summary for the configured database.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub database_path: String,
    pub exists:        bool,
}

/// One exported row. Column order is the file's column order.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    policy_id:                &'a str,
    batch_id:                 &'a str,
    application_receive_date: String,
    advisor_id:               &'a str,
    branch_name:              &'a str,
    sampling_frame_flag:      u8,
    selection_timestamp:      String,
}

impl<'a> From<&'a SelectionEntry> for ExportRow<'a> {
    fn from(e: &'a SelectionEntry) -> Self {
        Self {
            policy_id:                &e.policy_id,
            batch_id:                 &e.batch_id,
            application_receive_date: e.receive_date.format("%Y-%m-%d").to_string(),
            advisor_id:               &e.advisor_id,
            branch_name:              &e.branch_name,
            sampling_frame_flag:      e.flagged as u8,
            selection_timestamp:      e.selected_at.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        }
    }
}

pub struct QueryProjection {
    store: SelectionStore,
}

impl QueryProjection {
    /// Open the configured database read-only. Fails if it does not exist.
    pub fn open(config: &SamplerConfig) -> SamplerResult<Self> {
        Ok(Self {
            store: SelectionStore::open_read_only(&config.db_path)?,
        })
    }

    /// Wrap an existing store handle.
    pub fn over(store: SelectionStore) -> Self {
        Self { store }
    }

    /// Whether the configured database can be opened for reading.
    pub fn status(config: &SamplerConfig) -> StoreStatus {
        let exists = SelectionStore::open_read_only(&config.db_path).is_ok();
        StoreStatus {
            database_path: config.db_path.clone(),
            exists,
        }
    }

    /// All batch logs, most recent first.
    pub fn logs(&self) -> SamplerResult<Vec<BatchLog>> {
        self.store.list_logs()
    }

    pub fn selected_for_batch(&self, batch_id: &str) -> SamplerResult<Vec<SelectionEntry>> {
        self.store.selections_for_batch(batch_id)
    }

    pub fn selected_all(&self) -> SamplerResult<Vec<SelectionEntry>> {
        self.store.all_selections()
    }
}

/// Write entries as CSV with a header row. Returns the row count.
pub fn export_csv<W: Write>(entries: &[SelectionEntry], out: W) -> SamplerResult<usize> {
    let mut writer = csv::Writer::from_writer(out);
    for entry in entries {
        writer.serialize(ExportRow::from(entry))?;
    }
    if entries.is_empty() {
        writer.write_record([
            "policy_id",
            "batch_id",
            "application_receive_date",
            "advisor_id",
            "branch_name",
            "sampling_frame_flag",
            "selection_timestamp",
        ])?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(entries.len())
}

/// Export to a file at `path`, replacing it if present.
pub fn export_csv_file(entries: &[SelectionEntry], path: &Path) -> SamplerResult<usize> {
    let file = std::fs::File::create(path)
        .map_err(|e| anyhow::anyhow!("Cannot create {}: {e}", path.display()))?;
    export_csv(entries, file)
}
