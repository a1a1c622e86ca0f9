//! The batch recorder: one run of the selection pipeline.
//!
//! STAGES (fixed, never reordered):
//!   started -> validating -> sampling -> persisting -> completed
//!   any live stage -> failed
//!
//! RULES:
//!   - Sampling parameters are checked when the recorder is built,
//!     so a misconfigured recorder never touches storage.
//!   - The exclusion read, the sampler pass, the entry inserts and the
//!     success log row share one write transaction. They commit together
//!     or not at all.
//!   - A failed run rolls back, then appends a failure log row on its own
//!     so the attempt stays on record. Input rejected before a run starts
//!     goes through `record_failure` for the same reason.

use crate::{
    config::SamplerConfig,
    error::{SamplerError, SamplerResult},
    ingest::Ingestion,
    rng::SelectionRng,
    sampler::{self, SamplingParams},
    store::{BatchLog, SelectionEntry, SelectionStore},
    types::{RunStage, RunStatus},
};
use chrono::{SubsecRound, Utc};

pub struct BatchRecorder {
    store:  SelectionStore,
    params: SamplingParams,
}

impl BatchRecorder {
    /// Build a recorder over an already-migrated store.
    pub fn new(store: SelectionStore, params: SamplingParams) -> SamplerResult<Self> {
        params.validate()?;
        Ok(Self { store, params })
    }

    /// Validate the sampling parameters, then open and migrate the store
    /// named by the config.
    pub fn open(config: &SamplerConfig) -> SamplerResult<Self> {
        config.sampling.validate()?;
        let store = SelectionStore::open(&config.db_path)?;
        store.migrate()?;
        Self::new(store, config.sampling)
    }

    pub fn store(&self) -> &SelectionStore {
        &self.store
    }

    pub fn params(&self) -> &SamplingParams {
        &self.params
    }

    /// Run one batch and return its log row.
    ///
    /// On failure the error is returned after a failure row has been
    /// appended (if storage allows it).
    pub fn run_batch(
        &mut self,
        batch_id: &str,
        ingestion: &Ingestion,
        rng: &mut SelectionRng,
    ) -> SamplerResult<BatchLog> {
        let mut run = BatchRun::start(batch_id);

        match self.execute(&mut run, ingestion, rng) {
            Ok(log) => {
                run.advance(RunStage::Completed);
                log::info!("batch {batch_id}: {}", log.message);
                Ok(log)
            }
            Err(err) => {
                let failed_at = run.stage;
                run.advance(RunStage::Failed);
                let failure = self.failure_row(
                    batch_id,
                    failed_at,
                    &err,
                    ingestion.submitted_count() as u64,
                    ingestion.rejected_count() as u64,
                    rng.seed(),
                );
                if let Err(log_err) = self.store.append_log(&failure) {
                    log::error!("batch {batch_id}: could not record failure: {log_err}");
                }
                Err(err)
            }
        }
    }

    /// Record a run that failed before `run_batch` could start, e.g. an
    /// input file rejected as a whole. Returns the stored failure row.
    pub fn record_failure(
        &mut self,
        batch_id: &str,
        stage: RunStage,
        err: &SamplerError,
        seed: u64,
    ) -> SamplerResult<BatchLog> {
        let failure = self.failure_row(batch_id, stage, err, 0, 0, seed);
        self.store.append_log(&failure)
    }

    fn failure_row(
        &self,
        batch_id: &str,
        stage: RunStage,
        err: &SamplerError,
        submitted_count: u64,
        rejected_count: u64,
        seed: u64,
    ) -> BatchLog {
        log::error!("batch {batch_id}: failed during {stage}: {err}");
        BatchLog {
            log_id:         None,
            batch_id:       batch_id.to_string(),
            status:         RunStatus::Failure,
            message:        format!("Failed during {stage}: {err}"),
            submitted_count,
            rejected_count,
            eligible_count: 0,
            pool_type:      None,
            selected_count: 0,
            target_rate:    self.params.target_rate,
            min_count:      self.params.min_count,
            seed,
            logged_at:      Utc::now().trunc_subsecs(6),
        }
    }

    fn execute(
        &mut self,
        run: &mut BatchRun,
        ingestion: &Ingestion,
        rng: &mut SelectionRng,
    ) -> SamplerResult<BatchLog> {
        run.advance(RunStage::Validating);
        if ingestion.records.is_empty() {
            return Err(SamplerError::Validation(format!(
                "no valid rows in submission ({} rejected)",
                ingestion.rejected_count()
            )));
        }

        run.advance(RunStage::Sampling);
        let params = self.params;
        let batch_id = run.batch_id.clone();

        self.store.write_txn(|txn| {
            let prior_uses = txn.batch_id_uses(&batch_id)?;
            if prior_uses > 0 {
                log::warn!("batch {batch_id}: id already used by {prior_uses} earlier run(s)");
            }

            let excluded =
                txn.exclusion_set(ingestion.records.iter().map(|r| r.policy_id.as_str()))?;
            let selection = sampler::select(&ingestion.records, &excluded, &params, rng)?;

            run.advance(RunStage::Persisting);
            let selected_at = Utc::now().trunc_subsecs(6);
            let message = format!(
                "Selected {} from {} eligible (pool: {}, {} in pool, {} previously selected, {} of {} rows rejected).",
                selection.selected.len(),
                selection.eligible_count,
                selection.pool_type,
                selection.pool_size,
                selection.pool_size - selection.eligible_count,
                ingestion.rejected_count(),
                ingestion.submitted_count(),
            );
            let log = txn.append_log(&BatchLog {
                log_id:          None,
                batch_id:        batch_id.clone(),
                status:          RunStatus::Success,
                message,
                submitted_count: ingestion.submitted_count() as u64,
                rejected_count:  ingestion.rejected_count() as u64,
                eligible_count:  selection.eligible_count as u64,
                pool_type:       Some(selection.pool_type),
                selected_count:  selection.selected.len() as u64,
                target_rate:     params.target_rate,
                min_count:       params.min_count,
                seed:            rng.seed(),
                logged_at:       selected_at,
            })?;

            let entries: Vec<SelectionEntry> = selection
                .selected
                .iter()
                .map(|record| SelectionEntry::from_candidate(record, &batch_id, selected_at))
                .collect();
            txn.record(&entries, log.log_id)?;
            Ok(log)
        })
    }
}

/// Tracks the stage of a single run.
struct BatchRun {
    batch_id: String,
    stage:    RunStage,
}

impl BatchRun {
    fn start(batch_id: &str) -> Self {
        log::debug!("batch {batch_id}: {}", RunStage::Started);
        Self {
            batch_id: batch_id.to_string(),
            stage:    RunStage::Started,
        }
    }

    fn advance(&mut self, next: RunStage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal run transition {} -> {}",
            self.stage,
            next
        );
        log::debug!("batch {}: {} -> {}", self.batch_id, self.stage, next);
        self.stage = next;
    }
}
