//! Error types for the Bitcoin analyst

use thiserror::Error;

use crate::pipeline::PipelinePhase;

/// Result type alias for analyst operations
pub type Result<T> = std::result::Result<T, AnalystError>;

#[derive(Error, Debug)]
pub enum AnalystError {

    // =============================
    // Outbound Call Errors
    // =============================

    #[error("Rate limited by {0}")]
    RateLimited(String),

    #[error("Unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("{endpoint} failed after {attempts} attempts: {message}")]
    FetchExhausted {
        endpoint: String,
        attempts: u32,
        message: String,
    },

    // =============================
    // Pipeline Errors
    // =============================

    #[error("Analysis failed during {phase}: {source}")]
    AnalysisFailed {
        phase: PipelinePhase,
        #[source]
        source: Box<AnalystError>,
    },

    #[error("Relay failed: {0}")]
    RelayFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AnalystError {
    /// Default retry predicate: rate limits, bad statuses, schema failures
    /// and transport errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnalystError::RateLimited(_)
                | AnalystError::UnexpectedStatus { .. }
                | AnalystError::MalformedResponse(_)
                | AnalystError::HttpError(_)
        )
    }

    pub fn analysis_failed(phase: PipelinePhase, source: AnalystError) -> Self {
        AnalystError::AnalysisFailed {
            phase,
            source: Box::new(source),
        }
    }

    /// Phase a pipeline run aborted in, if this is an `AnalysisFailed`.
    pub fn failed_phase(&self) -> Option<PipelinePhase> {
        match self {
            AnalystError::AnalysisFailed { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}
