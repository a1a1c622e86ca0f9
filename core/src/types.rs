//! Shared primitive types used across the sampler.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A policy identifier. Unique within a submission and, once selected,
/// unique across the whole store history.
pub type PolicyId = String;

/// A caller-supplied batch identifier. Free-form, not enforced unique.
pub type BatchId = String;

/// A validated application row, ready for sampling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub policy_id:    PolicyId,
    pub receive_date: NaiveDate,
    pub advisor_id:   String,
    pub branch_name:  String,
    pub flagged:      bool,
}

/// Which pool a batch's selection was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolType {
    /// At least one candidate carried the sampling-frame flag.
    Flagged,
    /// No flagged candidates; the whole submission was the pool.
    Total,
}

impl PoolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flagged => "flagged",
            Self::Total   => "total",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "flagged" => Some(Self::Flagged),
            "total"   => Some(Self::Total),
            _ => None,
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of a batch run as recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stages of a single batch run.
///
/// `Failed` is terminal and reachable from every stage except `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Started,
    Validating,
    Sampling,
    Persisting,
    Completed,
    Failed,
}

impl RunStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started    => "started",
            Self::Validating => "validating",
            Self::Sampling   => "sampling",
            Self::Persisting => "persisting",
            Self::Completed  => "completed",
            Self::Failed     => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_advance_to(&self, next: RunStage) -> bool {
        use RunStage::*;
        match (self, next) {
            (Started, Validating)
            | (Validating, Sampling)
            | (Sampling, Persisting)
            | (Persisting, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
