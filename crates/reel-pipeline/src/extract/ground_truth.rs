//! Ground-truth pass-through extractor.
//!
//! The submission's event log arrives already timestamped and labeled,
//! so this extractor performs no media work; it exists so the log
//! flows through the same fusion path as every detected signal.

use async_trait::async_trait;

use reel_models::event::{CandidateEvent, SignalSource};

use super::{ExtractionContext, SignalExtractor};
use crate::error::PipelineResult;

pub struct GroundTruthExtractor {
    candidates: Vec<CandidateEvent>,
}

impl GroundTruthExtractor {
    pub fn new(candidates: Vec<CandidateEvent>) -> Self {
        Self { candidates }
    }
}

#[async_trait]
impl SignalExtractor for GroundTruthExtractor {
    fn source(&self) -> SignalSource {
        SignalSource::GroundTruth
    }

    async fn extract(&self, _ctx: &ExtractionContext<'_>) -> PipelineResult<Vec<CandidateEvent>> {
        Ok(self.candidates.clone())
    }
}
