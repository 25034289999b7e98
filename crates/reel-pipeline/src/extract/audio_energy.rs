//! Crowd-reaction detection from short-term audio energy.
//!
//! The source audio is decoded to mono PCM, split into fixed windows,
//! and each window's RMS energy is z-normalized against the whole
//! recording. Sustained excursions above the threshold become
//! candidates: crowd roars after goals and big chances dominate this
//! signal.

use async_trait::async_trait;

use reel_models::event::{CandidateEvent, SignalSource};

use super::pcm;
use super::{ExtractionContext, SignalExtractor, ANALYSIS_SAMPLE_RATE};
use crate::error::{PipelineError, PipelineResult};

pub struct AudioEnergyExtractor;

#[async_trait]
impl SignalExtractor for AudioEnergyExtractor {
    fn source(&self) -> SignalSource {
        SignalSource::AudioEnergy
    }

    async fn extract(&self, ctx: &ExtractionContext<'_>) -> PipelineResult<Vec<CandidateEvent>> {
        if !ctx.info.has_audio {
            return Ok(Vec::new());
        }

        let pcm_path = ctx.work_dir.join("analysis_audio.pcm");
        ctx.ops
            .extract_audio(ctx.source, ANALYSIS_SAMPLE_RATE, &pcm_path)
            .await?;
        let bytes = tokio::fs::read(&pcm_path).await?;
        let samples = pcm::decode_s16le(&bytes);
        if samples.is_empty() {
            return Err(PipelineError::extraction_failed(
                "audio_energy",
                "decoded audio is empty",
            ));
        }

        let window_len =
            (ANALYSIS_SAMPLE_RATE as u64 * ctx.config.audio_window_ms / 1000).max(1) as usize;
        let window_secs = window_len as f64 / ANALYSIS_SAMPLE_RATE as f64;
        let rms = pcm::windowed_rms(&samples, window_len);
        let z = pcm::z_scores(&rms);

        Ok(detect_bursts(
            &z,
            window_secs,
            ctx.config.audio_z_threshold,
            ctx.config.audio_min_dwell_windows,
        ))
    }
}

/// Turn a z-score series into candidates: runs of consecutive windows
/// above the threshold lasting at least the dwell minimum.
fn detect_bursts(
    z: &[f64],
    window_secs: f64,
    threshold: f64,
    min_dwell: usize,
) -> Vec<CandidateEvent> {
    let flags: Vec<bool> = z.iter().map(|&v| v >= threshold).collect();
    pcm::merge_flag_runs(&flags, 0)
        .into_iter()
        .filter(|(start, end)| end - start + 1 >= min_dwell.max(1))
        .map(|(start, end)| {
            let center = (start + end) as f64 / 2.0 * window_secs + window_secs / 2.0;
            let peak = z[start..=end].iter().cloned().fold(f64::MIN, f64::max);
            let confidence = (peak / (threshold * 2.0)).clamp(0.0, 1.0);
            CandidateEvent::new(SignalSource::AudioEnergy, center, confidence)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sustained_burst_detected() {
        let mut z = vec![0.0; 60];
        for v in &mut z[30..36] {
            *v = 3.5;
        }
        let candidates = detect_bursts(&z, 0.2, 2.0, 3);
        assert_eq!(candidates.len(), 1);
        // run spans windows 30..=35, center window 32.5
        assert!((candidates[0].timestamp_secs - 6.6).abs() < 1e-9);
        assert!(candidates[0].confidence > 0.8);
    }

    #[test]
    fn test_single_window_spike_ignored() {
        let mut z = vec![0.0; 60];
        z[10] = 5.0;
        assert!(detect_bursts(&z, 0.2, 2.0, 3).is_empty());
    }

    #[test]
    fn test_separate_bursts_stay_separate() {
        let mut z = vec![0.0; 100];
        for v in &mut z[10..15] {
            *v = 3.0;
        }
        for v in &mut z[50..55] {
            *v = 3.0;
        }
        assert_eq!(detect_bursts(&z, 0.2, 2.0, 3).len(), 2);
    }
}
