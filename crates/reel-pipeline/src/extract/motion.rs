//! Motion-burst detection inside the pitch region.
//!
//! Samples inter-frame luma difference at a low rate over the region of
//! interest and flags sustained high-motion stretches: counterattacks,
//! goal-mouth scrambles, celebrations.

use async_trait::async_trait;

use reel_models::event::{CandidateEvent, SignalSource};

use super::pcm::merge_flag_runs;
use super::{ExtractionContext, SignalExtractor};
use crate::error::PipelineResult;

pub struct MotionBurstExtractor;

#[async_trait]
impl SignalExtractor for MotionBurstExtractor {
    fn source(&self) -> SignalSource {
        SignalSource::MotionBurst
    }

    async fn extract(&self, ctx: &ExtractionContext<'_>) -> PipelineResult<Vec<CandidateEvent>> {
        let stats = ctx
            .ops
            .motion_stats(
                ctx.source,
                ctx.config.frame_sample_fps,
                Some(ctx.config.motion_roi),
            )
            .await?;

        let gap_frames =
            (ctx.config.motion_merge_gap_secs * ctx.config.frame_sample_fps).round() as usize;
        Ok(detect_motion_bursts(
            &stats,
            ctx.config.motion_threshold,
            gap_frames,
        ))
    }
}

/// `stats` is a series of `(pts_secs, mean_frame_difference)` pairs.
fn detect_motion_bursts(
    stats: &[(f64, f64)],
    threshold: f64,
    gap_frames: usize,
) -> Vec<CandidateEvent> {
    let flags: Vec<bool> = stats.iter().map(|&(_, d)| d >= threshold).collect();
    merge_flag_runs(&flags, gap_frames)
        .into_iter()
        .map(|(start, end)| {
            let center = (stats[start].0 + stats[end].0) / 2.0;
            let peak = stats[start..=end]
                .iter()
                .map(|&(_, d)| d)
                .fold(f64::MIN, f64::max);
            let confidence = (peak / (threshold * 2.0)).clamp(0.0, 1.0);
            CandidateEvent::new(SignalSource::MotionBurst, center, confidence)
        })
        .collect()
}
