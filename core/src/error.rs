use thiserror::Error;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid target rate {rate}: must be in (0, 1]")]
    InvalidRate { rate: f64 },

    #[error("Invalid min count {min_count}: must be at least 1")]
    InvalidMinCount { min_count: i64 },

    #[error("Policy '{policy_id}' has already been selected")]
    DuplicatePolicyId { policy_id: String },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),

    #[error("Tabular I/O error: {0}")]
    Tabular(#[from] csv::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SamplerResult<T> = Result<T, SamplerError>;
