//! The selection algorithm.
//!
//! RULE: The sampler is pure. It reads no storage and writes none.
//! Callers hand it the candidates, the exclusion set from the store,
//! the sampling parameters, and the RNG for this run.
//!
//! POOL POLICY (re-derived from the data on every run):
//!   - any candidate flagged  -> pool is the flagged candidates
//!   - no candidate flagged   -> pool is every candidate
//!
//! Previously selected ids are dropped from the pool before counting.

use crate::{
    error::{SamplerError, SamplerResult},
    types::{CandidateRecord, PoolType},
};
use rand::{seq::index, Rng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_TARGET_RATE: f64 = 0.01;
pub const DEFAULT_MIN_COUNT: i64 = 1;

const WHOLE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default = "default_target_rate")]
    pub target_rate: f64,
    #[serde(default = "default_min_count")]
    pub min_count: i64,
}

fn default_target_rate() -> f64 {
    DEFAULT_TARGET_RATE
}

fn default_min_count() -> i64 {
    DEFAULT_MIN_COUNT
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            target_rate: DEFAULT_TARGET_RATE,
            min_count:   DEFAULT_MIN_COUNT,
        }
    }
}

impl SamplingParams {
    pub fn new(target_rate: f64, min_count: i64) -> SamplerResult<Self> {
        let params = Self { target_rate, min_count };
        params.validate()?;
        Ok(params)
    }

    /// Rejects a rate outside (0, 1] (NaN included) and a min count below 1.
    pub fn validate(&self) -> SamplerResult<()> {
        if !(self.target_rate > 0.0 && self.target_rate <= 1.0) {
            return Err(SamplerError::InvalidRate { rate: self.target_rate });
        }
        if self.min_count < 1 {
            return Err(SamplerError::InvalidMinCount { min_count: self.min_count });
        }
        Ok(())
    }

    /// How many records to draw from an eligible pool of `eligible` records.
    ///
    /// `ceil(eligible * rate)`, raised to `min_count`, capped at `eligible`.
    pub fn target_count(&self, eligible: usize) -> usize {
        if eligible == 0 {
            return 0;
        }
        // A product that is whole up to float error (100 * 0.07) must not
        // round up to the next integer.
        let exact = eligible as f64 * self.target_rate;
        let by_rate = if (exact - exact.round()).abs() < WHOLE_EPSILON {
            exact.round()
        } else {
            exact.ceil()
        } as usize;
        let floor = usize::try_from(self.min_count).unwrap_or(usize::MAX);
        by_rate.max(floor).min(eligible)
    }
}

/// Result of one sampler pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub selected:       Vec<CandidateRecord>,
    pub pool_type:      PoolType,
    /// Pool size before exclusions.
    pub pool_size:      usize,
    /// Pool size after exclusions.
    pub eligible_count: usize,
}

/// Draw this batch's selection.
///
/// Selected records keep their relative input order, so a seeded RNG
/// always yields the same output sequence for the same inputs.
pub fn select<R: Rng + ?Sized>(
    candidates: &[CandidateRecord],
    excluded_ids: &HashSet<String>,
    params: &SamplingParams,
    rng: &mut R,
) -> SamplerResult<Selection> {
    params.validate()?;

    let flagged: Vec<&CandidateRecord> = candidates.iter().filter(|c| c.flagged).collect();
    let (pool, pool_type) = if flagged.is_empty() {
        (candidates.iter().collect::<Vec<_>>(), PoolType::Total)
    } else {
        (flagged, PoolType::Flagged)
    };
    let pool_size = pool.len();

    let eligible: Vec<&CandidateRecord> = pool
        .into_iter()
        .filter(|c| !excluded_ids.contains(&c.policy_id))
        .collect();
    let eligible_count = eligible.len();

    let target = params.target_count(eligible_count);
    let mut picks = if target == 0 {
        Vec::new()
    } else {
        index::sample(rng, eligible_count, target).into_vec()
    };
    picks.sort_unstable();

    let selected = picks.into_iter().map(|i| eligible[i].clone()).collect();

    log::debug!(
        "sampler: pool={pool_type} size={pool_size} eligible={eligible_count} target={target}"
    );

    Ok(Selection {
        selected,
        pool_type,
        pool_size,
        eligible_count,
    })
}
