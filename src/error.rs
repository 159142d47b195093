use std::path::PathBuf;

use thiserror::Error;

use crate::schema::MetricName;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Semantic index not found at {0}. Build the index for this document first.")]
    IndexNotFound(PathBuf),

    #[error("Extraction failed for metric '{metric}': {reason}")]
    ExtractionFailure { metric: MetricName, reason: String },

    #[error("No sheet in the workbook was mapped to metric '{0}'")]
    MappingAbsent(MetricName),

    #[error("Upstream service error: {0}")]
    UpstreamService(String),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to load document {path}: {reason}")]
    DocumentLoad { path: PathBuf, reason: String },

    #[error("Invalid semantic index: {0}")]
    InvalidIndex(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No KPIs stored for session '{0}'")]
    SessionNotFound(String),

    #[error("Analysis was cancelled before all metrics were extracted")]
    Cancelled,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AnalysisError {
    /// Stage-level failures abort the request; everything else degrades a
    /// single metric.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AnalysisError::ExtractionFailure { .. } | AnalysisError::MappingAbsent(_)
        )
    }
}

#[cfg(feature = "gemini")]
impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        AnalysisError::UpstreamService(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
