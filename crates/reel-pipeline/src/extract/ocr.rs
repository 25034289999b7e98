//! Scoreboard OCR bridge.
//!
//! Samples the scoreboard region and hands the crops to the configured
//! external OCR command. Only score-digit CHANGES become candidates;
//! a stable reading carries no event information.

use async_trait::async_trait;
use serde::Deserialize;

use reel_models::event::{CandidateEvent, SignalSource};

use super::{ExtractionContext, SignalExtractor};
use crate::error::{PipelineError, PipelineResult};

pub struct OcrExtractor;

#[derive(Debug, Deserialize)]
struct OcrLine {
    #[serde(default)]
    t: Option<f64>,
    #[serde(default)]
    frame: Option<u64>,
    text: String,
    #[serde(default = "default_ocr_confidence")]
    confidence: f64,
}

fn default_ocr_confidence() -> f64 {
    0.8
}

#[async_trait]
impl SignalExtractor for OcrExtractor {
    fn source(&self) -> SignalSource {
        SignalSource::Ocr
    }

    async fn extract(&self, ctx: &ExtractionContext<'_>) -> PipelineResult<Vec<CandidateEvent>> {
        let crops_dir = ctx.work_dir.join("ocr_crops");
        tokio::fs::create_dir_all(&crops_dir).await?;
        ctx.ops
            .sample_frames(
                ctx.source,
                ctx.config.frame_sample_fps,
                Some(ctx.config.ocr_region),
                &crops_dir,
            )
            .await?;

        let mut argv = ctx.config.ocr_command.clone();
        argv.push(crops_dir.to_string_lossy().into_owned());
        let stdout = ctx
            .ops
            .run_tool(&argv, "scoreboard_ocr", "read the scoreboard region")
            .await?;

        parse_score_changes(&stdout, ctx.config.frame_sample_fps)
    }
}

/// Normalize an OCR reading into `(home, away)` if it looks like a
/// score ("2-1", "2 - 1", "2:1").
fn parse_score(text: &str) -> Option<(u32, u32)> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == ':')
        .collect();
    let (home, away) = cleaned.split_once(['-', ':'])?;
    Some((home.parse().ok()?, away.parse().ok()?))
}

fn parse_score_changes(stdout: &str, fps: f64) -> PipelineResult<Vec<CandidateEvent>> {
    let mut candidates = Vec::new();
    let mut previous: Option<(u32, u32)> = None;

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let reading: OcrLine = serde_json::from_str(line).map_err(|e| {
            PipelineError::extraction_failed("scoreboard_ocr", format!("bad output line: {}", e))
        })?;
        let Some(ts) = reading.t.or_else(|| reading.frame.map(|f| f as f64 / fps)) else {
            continue;
        };
        let Some(score) = parse_score(&reading.text) else {
            continue; // unreadable frame, not a change
        };

        if let Some(prev) = previous {
            if score != prev {
                candidates.push(
                    CandidateEvent::new(SignalSource::Ocr, ts, reading.confidence)
                        .with_score_reading(format!("{}-{}", score.0, score.1)),
                );
            }
        }
        previous = Some(score);
    }
    Ok(candidates)
}
