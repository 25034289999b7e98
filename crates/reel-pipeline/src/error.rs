//! Pipeline error types.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Fusion produced no events: {0}")]
    EmptyTimeline(String),

    #[error("Stage '{stage}' failed after {attempts} attempts: {reason}")]
    StageFailed {
        stage: &'static str,
        reason: String,
        attempts: u32,
    },

    #[error("Job cancelled: {0}")]
    Cancelled(String),

    #[error("Job timed out after {0} seconds")]
    JobTimeout(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Submission invalid: {0}")]
    InvalidSubmission(String),

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),

    #[error("Illegal job transition: {0}")]
    Transition(#[from] reel_models::job::IllegalTransition),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn extraction_failed(source: &str, msg: impl Into<String>) -> Self {
        Self::ExtractionFailed(format!("{}: {}", source, msg.into()))
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn stage_failed(stage: &'static str, reason: impl Into<String>, attempts: u32) -> Self {
        Self::StageFailed {
            stage,
            reason: reason.into(),
            attempts,
        }
    }

    /// Attempt count to surface in the failed job record.
    pub fn attempts(&self) -> u32 {
        match self {
            PipelineError::StageFailed { attempts, .. } => *attempts,
            _ => 1,
        }
    }

    /// Stage name to surface when the failure carries one.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            PipelineError::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
