use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Bounded retry with exponential backoff for calls to the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt. 0 disables retrying.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (1-based): base, 2x base, 4x base...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u64.saturating_pow(attempt - 1);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Location of the persisted semantic index for PDF documents.
    pub index_path: PathBuf,
    /// Passages retrieved per metric question.
    pub retrieval_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Upper bound on metric extractions in flight at once.
    pub max_concurrent_extractions: usize,
    pub retry: RetryPolicy,
    pub generation_model: String,
    pub embedding_model: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("semantic_index.json"),
            retrieval_k: 5,
            chunk_size: 1500,
            chunk_overlap: 300,
            max_concurrent_extractions: 4,
            retry: RetryPolicy::default(),
            generation_model: "gemini-1.5-flash".to_string(),
            embedding_model: "text-embedding-004".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `FINRISK_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = PipelineConfig::default();

        if let Ok(path) = std::env::var("FINRISK_INDEX_PATH") {
            config.index_path = PathBuf::from(path);
        }
        if let Some(k) = env_parse("FINRISK_RETRIEVAL_K")? {
            config.retrieval_k = k;
        }
        if let Some(n) = env_parse("FINRISK_MAX_CONCURRENCY")? {
            config.max_concurrent_extractions = n;
        }
        if let Some(n) = env_parse("FINRISK_MAX_RETRIES")? {
            config.retry.max_retries = n;
        }
        if let Ok(model) = std::env::var("FINRISK_GENERATION_MODEL") {
            config.generation_model = model;
        }
        if let Ok(model) = std::env::var("FINRISK_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval_k == 0 {
            return Err(AnalysisError::InvalidConfig(
                "retrieval_k must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_extractions == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_concurrent_extractions must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(AnalysisError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AnalysisError::InvalidConfig(format!("{key} has invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}
