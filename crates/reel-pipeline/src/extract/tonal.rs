//! Referee-whistle detection.
//!
//! Looks for windows where the whistle band carries a large share of
//! the total energy. Detections within the configured gap merge into a
//! single candidate so a long blast reads as one event.

use async_trait::async_trait;

use reel_models::event::{CandidateEvent, SignalSource};

use super::pcm;
use super::{ExtractionContext, SignalExtractor, ANALYSIS_SAMPLE_RATE};
use crate::error::PipelineResult;

pub struct TonalExtractor;

#[async_trait]
impl SignalExtractor for TonalExtractor {
    fn source(&self) -> SignalSource {
        SignalSource::Tonal
    }

    async fn extract(&self, ctx: &ExtractionContext<'_>) -> PipelineResult<Vec<CandidateEvent>> {
        if !ctx.info.has_audio {
            return Ok(Vec::new());
        }

        // Own scratch file; the energy extractor runs concurrently.
        let pcm_path = ctx.work_dir.join("tonal_audio.pcm");
        ctx.ops
            .extract_audio(ctx.source, ANALYSIS_SAMPLE_RATE, &pcm_path)
            .await?;
        let bytes = tokio::fs::read(&pcm_path).await?;
        let samples = pcm::decode_s16le(&bytes);
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let window_len = (ANALYSIS_SAMPLE_RATE as usize / 10).max(1); // 100ms
        let window_secs = window_len as f64 / ANALYSIS_SAMPLE_RATE as f64;
        let ratios: Vec<f64> = samples
            .chunks_exact(window_len)
            .map(|w| pcm::band_energy_ratio(w, ANALYSIS_SAMPLE_RATE, ctx.config.tonal_band_hz))
            .collect();

        let gap_windows = (ctx.config.tonal_merge_gap_secs / window_secs).round() as usize;
        Ok(detect_whistles(
            &ratios,
            window_secs,
            ctx.config.tonal_ratio_threshold,
            gap_windows,
        ))
    }
}

fn detect_whistles(
    ratios: &[f64],
    window_secs: f64,
    threshold: f64,
    gap_windows: usize,
) -> Vec<CandidateEvent> {
    let flags: Vec<bool> = ratios.iter().map(|&r| r >= threshold).collect();
    pcm::merge_flag_runs(&flags, gap_windows)
        .into_iter()
        .map(|(start, end)| {
            let center = (start + end) as f64 / 2.0 * window_secs + window_secs / 2.0;
            let peak = ratios[start..=end].iter().cloned().fold(f64::MIN, f64::max);
            CandidateEvent::new(SignalSource::Tonal, center, peak.clamp(0.0, 1.0))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blast_with_short_break_is_one_candidate() {
        let mut ratios = vec![0.05; 100];
        for v in &mut ratios[40..44] {
            *v = 0.6;
        }
        // 0.3s break, then the second half of the blast
        for v in &mut ratios[47..50] {
            *v = 0.55;
        }
        let candidates = detect_whistles(&ratios, 0.1, 0.35, 5);
        assert_eq!(candidates.len(), 1);
        assert!((candidates[0].confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_distant_blasts_are_separate() {
        let mut ratios = vec![0.05; 200];
        ratios[20] = 0.5;
        ratios[150] = 0.5;
        assert_eq!(detect_whistles(&ratios, 0.1, 0.35, 5).len(), 2);
    }

    #[test]
    fn test_quiet_recording_yields_nothing() {
        assert!(detect_whistles(&[0.1; 50], 0.1, 0.35, 5).is_empty());
    }
}
