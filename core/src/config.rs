use crate::sampler::SamplingParams;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DB_PATH: &str = "sampler_data.db";

/// Process-level settings, resolved once at start-up and handed to the
/// recorder and the query projection. Nothing reads a global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// SQLite path or URI.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(flatten)]
    pub sampling: SamplingParams,
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            db_path:  default_db_path(),
            sampling: SamplingParams::default(),
        }
    }
}

impl SamplerConfig {
    /// Load from a JSON config file. Missing keys take their defaults.
    /// In tests, use SamplerConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: SamplerConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config
            .sampling
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration error in {path}: {e}"))?;
        Ok(config)
    }

    /// Config pointing at a private in-memory database.
    pub fn default_test() -> Self {
        Self {
            db_path:  ":memory:".into(),
            sampling: SamplingParams::default(),
        }
    }

    pub fn with_db_path(mut self, db_path: impl Into<String>) -> Self {
        self.db_path = db_path.into();
        self
    }
}
