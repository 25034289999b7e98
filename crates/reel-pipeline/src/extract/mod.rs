//! Signal extractors.
//!
//! Each extractor is an independent, order-insensitive pass over the
//! source media emitting timestamped candidate events. Extractors never
//! block on each other and a failure in one never prevents the others
//! from completing.

use async_trait::async_trait;
use futures::future::join_all;
use std::path::Path;

use reel_media::{MediaOps, VideoInfo};
use reel_models::config::SignalConfig;
use reel_models::event::{CandidateEvent, SignalSource};

use crate::error::PipelineResult;
use crate::logging::JobLogger;

pub mod audio_energy;
pub mod ground_truth;
pub mod motion;
pub mod object;
pub mod ocr;
pub mod pcm;
pub mod tonal;

pub use audio_energy::AudioEnergyExtractor;
pub use ground_truth::GroundTruthExtractor;
pub use motion::MotionBurstExtractor;
pub use object::ObjectExtractor;
pub use ocr::OcrExtractor;
pub use tonal::TonalExtractor;

/// Sample rate used for acoustic analysis.
pub const ANALYSIS_SAMPLE_RATE: u32 = 16000;

/// Everything an extractor may read. Shared read-only across the
/// concurrently running extractors.
pub struct ExtractionContext<'a> {
    pub source: &'a Path,
    pub info: &'a VideoInfo,
    pub ops: &'a dyn MediaOps,
    pub config: &'a SignalConfig,
    /// Isolated scratch directory for this job's extraction stage
    pub work_dir: &'a Path,
}

/// A pure detection pass: `(source media, config) -> candidates`.
#[async_trait]
pub trait SignalExtractor: Send + Sync {
    fn source(&self) -> SignalSource;

    async fn extract(&self, ctx: &ExtractionContext<'_>) -> PipelineResult<Vec<CandidateEvent>>;
}

/// Build the extractor set enabled by the configuration. The
/// ground-truth log, when present, joins as a zero-cost extractor.
pub fn enabled_extractors(
    config: &SignalConfig,
    ground_truth: Vec<CandidateEvent>,
) -> Vec<Box<dyn SignalExtractor>> {
    let mut extractors: Vec<Box<dyn SignalExtractor>> = Vec::new();

    if !ground_truth.is_empty() {
        extractors.push(Box::new(GroundTruthExtractor::new(ground_truth)));
    }
    if config.enable_object_detector && !config.detector_command.is_empty() {
        extractors.push(Box::new(ObjectExtractor));
    }
    if config.enable_audio_energy {
        extractors.push(Box::new(AudioEnergyExtractor));
    }
    if config.enable_tonal {
        extractors.push(Box::new(TonalExtractor));
    }
    if config.enable_motion_burst {
        extractors.push(Box::new(MotionBurstExtractor));
    }
    if config.enable_ocr && !config.ocr_command.is_empty() {
        extractors.push(Box::new(OcrExtractor));
    }

    extractors
}

/// Run all extractors concurrently, isolating failures.
///
/// A failing or empty extractor is logged and its contribution treated
/// as absent; the merged candidate list from the survivors is returned.
pub async fn run_all(
    extractors: &[Box<dyn SignalExtractor>],
    ctx: &ExtractionContext<'_>,
    logger: &JobLogger,
) -> Vec<CandidateEvent> {
    let results = join_all(extractors.iter().map(|e| async move {
        (e.source(), e.extract(ctx).await)
    }))
    .await;

    let mut candidates = Vec::new();
    for (source, result) in results {
        match result {
            Ok(batch) => {
                logger.progress(&format!("{} emitted {} candidates", source, batch.len()));
                candidates.extend(batch);
            }
            Err(e) => {
                logger.warning(&format!("{} failed, continuing without it: {}", source, e));
            }
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::event::EventKind;

    #[test]
    fn test_enabled_extractors_respect_config() {
        let mut config = SignalConfig::default();
        config.enable_object_detector = false; // no detector command anyway
        config.enable_ocr = false;

        let set = enabled_extractors(&config, Vec::new());
        let sources: Vec<_> = set.iter().map(|e| e.source()).collect();
        assert_eq!(
            sources,
            vec![
                SignalSource::AudioEnergy,
                SignalSource::Tonal,
                SignalSource::MotionBurst
            ]
        );
    }

    #[test]
    fn test_ground_truth_joins_when_supplied() {
        let config = SignalConfig {
            enable_audio_energy: false,
            enable_tonal: false,
            enable_motion_burst: false,
            enable_object_detector: false,
            enable_ocr: false,
            ..Default::default()
        };
        let truth = vec![CandidateEvent::new(SignalSource::GroundTruth, 1380.0, 1.0)
            .with_truth(EventKind::goal())];

        let set = enabled_extractors(&config, truth);
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].source(), SignalSource::GroundTruth);
    }

    #[test]
    fn test_object_extractor_needs_command() {
        let config = SignalConfig {
            enable_audio_energy: false,
            enable_tonal: false,
            enable_motion_burst: false,
            enable_ocr: false,
            ..Default::default()
        };
        // enabled but no command configured
        assert!(enabled_extractors(&config, Vec::new()).is_empty());
    }
}
