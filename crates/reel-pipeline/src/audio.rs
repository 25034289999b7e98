//! Audio mastering: overlay-synchronized ducking followed by two-pass
//! loudness normalization.
//!
//! Ducking runs first so the correction pass measures the final mix.
//! Both passes operate on the assembled reel, never on individual
//! clips.

use std::path::{Path, PathBuf};

use reel_media::filters::duck_volume_filter;
use reel_media::loudness::{loudnorm_apply_filter, loudnorm_measure_filter};
use reel_media::MediaOps;
use reel_models::config::AudioConfig;

use crate::error::PipelineResult;
use crate::logging::JobLogger;

pub struct AudioEngine<'a> {
    ops: &'a dyn MediaOps,
    config: &'a AudioConfig,
    logger: JobLogger,
}

impl<'a> AudioEngine<'a> {
    pub fn new(ops: &'a dyn MediaOps, config: &'a AudioConfig, logger: JobLogger) -> Self {
        Self {
            ops,
            config,
            logger,
        }
    }

    /// Master the assembled reel: duck under the given overlay ranges,
    /// then normalize to the configured loudness target.
    pub async fn master(
        &self,
        reel: &Path,
        overlay_ranges: &[(f64, f64)],
        work_dir: &Path,
    ) -> PipelineResult<PathBuf> {
        let ducked = self.duck(reel, overlay_ranges, work_dir).await?;
        self.normalize(&ducked, work_dir).await
    }

    /// Attenuate audio under overlays. A reel without overlay ranges
    /// passes through untouched.
    async fn duck(
        &self,
        reel: &Path,
        ranges: &[(f64, f64)],
        work_dir: &Path,
    ) -> PipelineResult<PathBuf> {
        let Some(filter) =
            duck_volume_filter(ranges, self.config.duck_db, self.config.duck_fade_secs)
        else {
            return Ok(reel.to_path_buf());
        };

        let out = work_dir.join("reel_ducked.mp4");
        self.ops
            .apply_filter(
                reel,
                None,
                Some(&filter),
                &out,
                "duck",
                &format!(
                    "Duck audio by {:.1} dB under {} overlay ranges",
                    self.config.duck_db,
                    ranges.len()
                ),
            )
            .await?;
        self.logger
            .progress(&format!("ducked {} overlay ranges", ranges.len()));
        Ok(out)
    }

    /// Two-pass loudness normalization: measure, then apply a linear
    /// correction built from the measurements.
    async fn normalize(&self, media: &Path, work_dir: &Path) -> PipelineResult<PathBuf> {
        let measure = loudnorm_measure_filter(
            self.config.target_lufs,
            self.config.true_peak_db,
            self.config.target_lra,
        );
        let stats = self.ops.measure_loudness(media, &measure).await?;
        self.logger.progress(&format!(
            "measured {:.1} LUFS / {:.1} dBTP, correcting to {:.1} LUFS",
            stats.input_i, stats.input_tp, self.config.target_lufs
        ));

        let apply = loudnorm_apply_filter(
            self.config.target_lufs,
            self.config.true_peak_db,
            self.config.target_lra,
            &stats,
        );
        let out = work_dir.join("reel_mastered.mp4");
        self.ops.apply_loudnorm(media, &apply, &out).await?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeMediaOps;
    use reel_models::JobId;

    fn logger() -> JobLogger {
        JobLogger::new(&JobId::from_string("test"), "mastering")
    }

    #[tokio::test]
    async fn test_master_runs_duck_then_two_passes() {
        let ops = FakeMediaOps::new();
        let config = AudioConfig::default();
        let engine = AudioEngine::new(&ops, &config, logger());
        let work = tempfile::tempdir().unwrap();

        let out = engine
            .master(Path::new("/tmp/reel.mp4"), &[(0.0, 4.0)], work.path())
            .await
            .unwrap();

        assert!(out.ends_with("reel_mastered.mp4"));
        let names = ops.operation_names();
        assert_eq!(names, vec!["duck", "measure_loudness", "apply_loudnorm"]);
    }

    #[tokio::test]
    async fn test_no_overlays_skips_ducking() {
        let ops = FakeMediaOps::new();
        let config = AudioConfig::default();
        let engine = AudioEngine::new(&ops, &config, logger());
        let work = tempfile::tempdir().unwrap();

        engine
            .master(Path::new("/tmp/reel.mp4"), &[], work.path())
            .await
            .unwrap();

        let names = ops.operation_names();
        assert_eq!(names, vec!["measure_loudness", "apply_loudnorm"]);
    }

    #[tokio::test]
    async fn test_apply_filter_carries_measurements() {
        let ops = FakeMediaOps::new();
        let config = AudioConfig::default();
        let engine = AudioEngine::new(&ops, &config, logger());
        let work = tempfile::tempdir().unwrap();

        engine
            .master(Path::new("/tmp/reel.mp4"), &[], work.path())
            .await
            .unwrap();

        let loudnorm = ops
            .operations()
            .into_iter()
            .find(|op| op.name == "apply_loudnorm")
            .unwrap();
        assert!(loudnorm.detail.contains("I=-14.0"));
        assert!(loudnorm.detail.contains("measured_I="));
        assert!(loudnorm.detail.contains("linear=true"));
    }
}
