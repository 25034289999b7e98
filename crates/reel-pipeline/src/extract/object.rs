//! Object-detector bridge.
//!
//! Frames are sampled to a scratch directory and handed to the
//! configured external detector command, which prints one JSON object
//! per detection on stdout. Detections carry a normalized bounding box
//! that later drives dynamic framing.

use async_trait::async_trait;
use serde::Deserialize;

use reel_models::event::{BoundingBox, CandidateEvent, SignalSource};

use super::{ExtractionContext, SignalExtractor};
use crate::error::{PipelineError, PipelineResult};

pub struct ObjectExtractor;

/// One stdout line from the detector. Timestamps come either directly
/// (`t`, seconds) or as a zero-based sampled-frame index (`frame`).
#[derive(Debug, Deserialize)]
pub(crate) struct DetectionLine {
    #[serde(default)]
    pub t: Option<f64>,
    #[serde(default)]
    pub frame: Option<u64>,
    pub confidence: f64,
    /// Normalized (x, y, w, h)
    pub bbox: (f64, f64, f64, f64),
}

impl DetectionLine {
    pub(crate) fn timestamp(&self, fps: f64) -> Option<f64> {
        self.t.or_else(|| self.frame.map(|f| f as f64 / fps))
    }
}

#[async_trait]
impl SignalExtractor for ObjectExtractor {
    fn source(&self) -> SignalSource {
        SignalSource::ObjectDetector
    }

    async fn extract(&self, ctx: &ExtractionContext<'_>) -> PipelineResult<Vec<CandidateEvent>> {
        let frames_dir = ctx.work_dir.join("detector_frames");
        tokio::fs::create_dir_all(&frames_dir).await?;
        ctx.ops
            .sample_frames(ctx.source, ctx.config.frame_sample_fps, None, &frames_dir)
            .await?;

        let mut argv = ctx.config.detector_command.clone();
        argv.push(frames_dir.to_string_lossy().into_owned());
        let stdout = ctx
            .ops
            .run_tool(&argv, "object_detector", "detect ball and player cluster")
            .await?;

        parse_detections(&stdout, ctx.config.frame_sample_fps)
    }
}

fn parse_detections(stdout: &str, fps: f64) -> PipelineResult<Vec<CandidateEvent>> {
    let mut candidates = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let detection: DetectionLine = serde_json::from_str(line).map_err(|e| {
            PipelineError::extraction_failed("object_detector", format!("bad output line: {}", e))
        })?;
        let Some(ts) = detection.timestamp(fps) else {
            continue;
        };
        let (x, y, w, h) = detection.bbox;
        let bbox = BoundingBox::new(x, y, w, h);
        if !bbox.is_valid() {
            continue;
        }
        candidates.push(
            CandidateEvent::new(SignalSource::ObjectDetector, ts, detection.confidence)
                .with_bbox(bbox),
        );
    }
    Ok(candidates)
}
