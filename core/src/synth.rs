//! Deterministic synthetic submissions for demos and load checks.
//!
//! Same seed, same file: policy ids are uuids built from RNG bytes,
//! never from the platform RNG.

use crate::{error::SamplerResult, rng::SelectionRng, types::CandidateRecord};
use chrono::{Duration, NaiveDate};
use rand::RngCore;
use serde::Serialize;
use std::io::Write;

const BRANCHES: [&str; 6] = [
    "Maple Branch",
    "Oak Office",
    "Pine Plaza",
    "Cedar Centre",
    "Birch Bureau",
    "Willow Way",
];
const ADVISOR_COUNT: u64 = 75;
const DATE_WINDOW_DAYS: u64 = 120;

pub struct SyntheticBatch {
    pub records:       usize,
    pub flagged_ratio: f64,
    pub end_date:      NaiveDate,
}

#[derive(Serialize)]
struct OutputRow<'a> {
    policy_id:                &'a str,
    application_receive_date: String,
    advisor_id:               &'a str,
    branch_name:              &'a str,
    sampling_frame_flag:      u8,
}

impl SyntheticBatch {
    /// Generate records with receive dates in the 120 days up to `end_date`.
    pub fn generate(&self, rng: &mut SelectionRng) -> Vec<CandidateRecord> {
        (0..self.records)
            .map(|_| {
                let mut bytes = [0u8; 16];
                rng.fill_bytes(&mut bytes);
                let policy_id = uuid::Builder::from_random_bytes(bytes).into_uuid().to_string();
                let days_back = rng.next_u64_below(DATE_WINDOW_DAYS + 1) as i64;
                let advisor = rng.next_u64_below(ADVISOR_COUNT) + 1;
                let branch = BRANCHES[rng.next_u64_below(BRANCHES.len() as u64) as usize];
                CandidateRecord {
                    policy_id,
                    receive_date: self.end_date - Duration::days(days_back),
                    advisor_id: format!("ADV{advisor:03}"),
                    branch_name: branch.to_string(),
                    flagged: rng.chance(self.flagged_ratio),
                }
            })
            .collect()
    }

    /// Generate and write as CSV in the ingestion column layout.
    pub fn write_csv<W: Write>(&self, rng: &mut SelectionRng, out: W) -> SamplerResult<usize> {
        let records = self.generate(rng);
        let mut writer = csv::Writer::from_writer(out);
        for r in &records {
            writer.serialize(OutputRow {
                policy_id:                &r.policy_id,
                application_receive_date: r.receive_date.format("%Y-%m-%d").to_string(),
                advisor_id:               &r.advisor_id,
                branch_name:              &r.branch_name,
                sampling_frame_flag:      r.flagged as u8,
            })?;
        }
        writer.flush().map_err(csv::Error::from)?;
        let flagged = records.iter().filter(|r| r.flagged).count();
        log::info!("synth: wrote {} records, {flagged} flagged", records.len());
        Ok(records.len())
    }
}
