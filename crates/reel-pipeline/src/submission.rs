//! Job submission: the caller-facing input of the pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use reel_models::event::{CandidateEvent, EventKind, SignalSource};
use reel_models::timestamp::parse_timestamp;
use reel_models::{MatchDescriptor, RenderConfig};

use crate::error::{PipelineError, PipelineResult};

/// One externally supplied, already-timestamped event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthEntry {
    /// Timestamp in the recording (HH:MM:SS, MM:SS or seconds)
    pub timestamp: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// A complete render request: match metadata, the source recording,
/// an optional partial ground-truth log, and the render configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    pub descriptor: MatchDescriptor,
    pub source: PathBuf,
    #[serde(default)]
    pub ground_truth: Vec<GroundTruthEntry>,
    #[serde(default)]
    pub config: RenderConfig,
}

impl JobSubmission {
    /// Load a submission from a JSON file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let submission: JobSubmission = serde_json::from_str(&text)?;
        submission.validate()?;
        Ok(submission)
    }

    /// Validate timestamps and the source reference.
    pub fn validate(&self) -> PipelineResult<()> {
        for entry in &self.ground_truth {
            parse_timestamp(&entry.timestamp).map_err(|e| {
                PipelineError::InvalidSubmission(format!(
                    "ground-truth timestamp '{}': {}",
                    entry.timestamp, e
                ))
            })?;
        }
        if self.source.as_os_str().is_empty() {
            return Err(PipelineError::InvalidSubmission(
                "source path is empty".into(),
            ));
        }
        Ok(())
    }

    /// Convert the ground-truth log into maximum-trust candidates.
    pub fn ground_truth_candidates(&self) -> PipelineResult<Vec<CandidateEvent>> {
        self.ground_truth
            .iter()
            .map(|entry| {
                let secs = parse_timestamp(&entry.timestamp).map_err(|e| {
                    PipelineError::InvalidSubmission(format!(
                        "ground-truth timestamp '{}': {}",
                        entry.timestamp, e
                    ))
                })?;
                Ok(CandidateEvent::new(SignalSource::GroundTruth, secs, 1.0)
                    .with_truth(entry.kind.clone()))
            })
            .collect()
    }
}
