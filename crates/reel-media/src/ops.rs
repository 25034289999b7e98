//! The media-operation seam.
//!
//! Every external media invocation the pipeline performs goes through
//! the `MediaOps` trait: the FFmpeg-backed implementation shells out,
//! applies the per-operation timeout, and records each invocation in
//! the reproduction log. Stages never invoke external tools directly,
//! so tests substitute a fake.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use reel_models::plan::TimeRange;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::loudness::{parse_loudnorm_stats, LoudnessStats};
use crate::probe::{probe_video, VideoInfo};
use crate::replay::ReproductionLog;

/// Stabilization parameters for the two-pass vidstab flow.
#[derive(Debug, Clone, Copy)]
pub struct StabilizeParams {
    /// Shakiness sensitivity (1-10)
    pub shakiness: u8,
    /// Transform smoothing window, frames
    pub smoothing: u32,
}

/// A graphic asset to render once per job.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayAssetSpec {
    pub width: u32,
    pub height: u32,
    /// lavfi color spec (e.g., "black@0.65")
    pub background: String,
    /// Text lines, stacked top to bottom
    pub lines: Vec<String>,
    /// When set, render a video segment of this length (slates) with a
    /// silent audio track; otherwise render a single-frame image.
    pub duration_secs: Option<f64>,
}

/// External media operations available to pipeline stages.
#[async_trait]
pub trait MediaOps: Send + Sync {
    /// Inspect the source recording.
    async fn probe(&self, source: &Path) -> MediaResult<VideoInfo>;

    /// Losslessly re-encode a source range into a standalone clip.
    async fn extract_segment(&self, source: &Path, range: TimeRange, out: &Path)
        -> MediaResult<()>;

    /// Decode the audio track to raw mono s16le PCM at `sample_rate`.
    async fn extract_audio(&self, source: &Path, sample_rate: u32, out: &Path) -> MediaResult<()>;

    /// Sample frames at `fps`, optionally cropped to a normalized
    /// region, into `out_dir`. Returns the written frame paths in order.
    async fn sample_frames(
        &self,
        source: &Path,
        fps: f64,
        region: Option<(f64, f64, f64, f64)>,
        out_dir: &Path,
    ) -> MediaResult<Vec<PathBuf>>;

    /// Per-frame luma-difference statistics over a sampled, optionally
    /// cropped stream. Returns (time, mean difference) pairs.
    async fn motion_stats(
        &self,
        source: &Path,
        fps: f64,
        region: Option<(f64, f64, f64, f64)>,
    ) -> MediaResult<Vec<(f64, f64)>>;

    /// Stabilization pass one: analyze motion into a transform file.
    async fn stabilize_detect(&self, clip: &Path, params: StabilizeParams, trf: &Path)
        -> MediaResult<()>;

    /// Stabilization pass two: apply smoothed inverse transforms.
    async fn stabilize_apply(
        &self,
        clip: &Path,
        trf: &Path,
        params: StabilizeParams,
        out: &Path,
    ) -> MediaResult<()>;

    /// Apply video and/or audio filters to a clip.
    async fn apply_filter(
        &self,
        clip: &Path,
        video_filter: Option<&str>,
        audio_filter: Option<&str>,
        out: &Path,
        name: &str,
        description: &str,
    ) -> MediaResult<()>;

    /// Composite an overlay asset onto a clip with a filter_complex
    /// graph referencing inputs `[0:v]` and `[1:v]`.
    async fn overlay_composite(
        &self,
        clip: &Path,
        asset: &Path,
        filter_complex: &str,
        out: &Path,
        description: &str,
    ) -> MediaResult<()>;

    /// Render a graphic asset (scoreboard, lower-third, slate).
    async fn render_overlay_asset(&self, spec: &OverlayAssetSpec, out: &Path) -> MediaResult<()>;

    /// Time-stretch a clip (video and audio) by `factor` (< 1.0 slows).
    async fn time_stretch(&self, clip: &Path, factor: f64, out: &Path) -> MediaResult<()>;

    /// Loudness measurement pass; `filter` is the measurement loudnorm
    /// string.
    async fn measure_loudness(&self, media: &Path, filter: &str) -> MediaResult<LoudnessStats>;

    /// Loudness correction pass.
    async fn apply_loudnorm(&self, media: &Path, filter: &str, out: &Path) -> MediaResult<()>;

    /// Concatenate clips losslessly, in order.
    async fn concat(&self, clips: &[PathBuf], out: &Path) -> MediaResult<()>;

    /// Run a configured external tool (detector, OCR) and capture its
    /// stdout.
    async fn run_tool(&self, argv: &[String], name: &str, description: &str)
        -> MediaResult<String>;
}

/// FFmpeg-backed implementation of `MediaOps`.
pub struct FfmpegOps {
    log: Arc<ReproductionLog>,
    timeout_secs: Option<u64>,
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Encoder settings shared by every re-encode
    crf: u8,
    preset: String,
}

impl FfmpegOps {
    pub fn new(log: Arc<ReproductionLog>) -> Self {
        Self {
            log,
            timeout_secs: None,
            cancel_rx: None,
            crf: 18,
            preset: "medium".to_string(),
        }
    }

    /// Per-operation timeout applied to every invocation.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Cancellation signal checked after each invocation.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    fn runner(&self) -> FfmpegRunner {
        let mut runner = FfmpegRunner::new();
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }
        if let Some(ref rx) = self.cancel_rx {
            runner = runner.with_cancel(rx.clone());
        }
        runner
    }

    /// Record and run one FFmpeg command, returning captured stderr.
    async fn run_logged(
        &self,
        cmd: &FfmpegCommand,
        name: &str,
        description: &str,
    ) -> MediaResult<String> {
        let args = cmd.build_args();
        self.log.record(name, description, "ffmpeg", &args)?;
        debug!(op = name, "media operation");
        self.runner().run_capture(cmd).await
    }

    fn encoded(&self, cmd: FfmpegCommand) -> FfmpegCommand {
        cmd.video_codec("libx264")
            .crf(self.crf)
            .preset(self.preset.clone())
            .audio_codec("aac")
    }
}

#[async_trait]
impl MediaOps for FfmpegOps {
    async fn probe(&self, source: &Path) -> MediaResult<VideoInfo> {
        self.log.record(
            "probe",
            &format!("Probe source {}", source.display()),
            "ffprobe",
            &[
                "-v".into(),
                "quiet".into(),
                "-print_format".into(),
                "json".into(),
                "-show_format".into(),
                "-show_streams".into(),
                source.to_string_lossy().to_string(),
            ],
        )?;
        probe_video(source).await
    }

    async fn extract_segment(
        &self,
        source: &Path,
        range: TimeRange,
        out: &Path,
    ) -> MediaResult<()> {
        let cmd = self.encoded(
            FfmpegCommand::new(source, out)
                .seek(range.start_secs)
                .duration(range.duration_secs()),
        );
        self.run_logged(
            &cmd,
            "extract_segment",
            &format!(
                "Extract {:.1}s-{:.1}s from {}",
                range.start_secs,
                range.end_secs,
                source.display()
            ),
        )
        .await
        .map(|_| ())
    }

    async fn extract_audio(&self, source: &Path, sample_rate: u32, out: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(source, out)
            .no_video()
            .output_args(["-ac", "1"])
            .output_args(["-ar", &sample_rate.to_string()])
            .output_args(["-f", "s16le"]);
        self.run_logged(
            &cmd,
            "extract_audio",
            &format!("Decode mono {} Hz PCM from {}", sample_rate, source.display()),
        )
        .await
        .map(|_| ())
    }

    async fn sample_frames(
        &self,
        source: &Path,
        fps: f64,
        region: Option<(f64, f64, f64, f64)>,
        out_dir: &Path,
    ) -> MediaResult<Vec<PathBuf>> {
        std::fs::create_dir_all(out_dir)?;
        let pattern = out_dir.join("frame_%05d.png");

        let mut filter = format!("fps={:.3}", fps);
        if let Some(region) = region {
            filter.push(',');
            filter.push_str(&crate::filters::region_crop_filter(region));
        }

        let cmd = FfmpegCommand::new(source, &pattern).video_filter(filter);
        self.run_logged(
            &cmd,
            "sample_frames",
            &format!("Sample frames at {:.2} fps into {}", fps, out_dir.display()),
        )
        .await?;

        let mut frames: Vec<PathBuf> = std::fs::read_dir(out_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "png").unwrap_or(false))
            .collect();
        frames.sort();
        Ok(frames)
    }

    async fn motion_stats(
        &self,
        source: &Path,
        fps: f64,
        region: Option<(f64, f64, f64, f64)>,
    ) -> MediaResult<Vec<(f64, f64)>> {
        let stats_dir = tempfile::tempdir()?;
        let stats_path = stats_dir.path().join("signalstats.txt");

        let mut filter = format!("fps={:.3}", fps);
        if let Some(region) = region {
            filter.push(',');
            filter.push_str(&crate::filters::region_crop_filter(region));
        }
        filter.push_str(&format!(
            ",signalstats,metadata=print:key=lavfi.signalstats.YDIF:file={}",
            stats_path.display()
        ));

        let cmd = FfmpegCommand::new(source, "/dev/null")
            .video_filter(filter)
            .output_args(["-f", "null"])
            .no_audio();
        self.run_logged(
            &cmd,
            "motion_stats",
            &format!("Measure frame-difference motion of {}", source.display()),
        )
        .await?;

        let text = std::fs::read_to_string(&stats_path)?;
        Ok(parse_signalstats(&text))
    }

    async fn stabilize_detect(
        &self,
        clip: &Path,
        params: StabilizeParams,
        trf: &Path,
    ) -> MediaResult<()> {
        let filter = format!(
            "vidstabdetect=shakiness={}:result={}",
            params.shakiness,
            trf.display()
        );
        // Analysis pass discards its output stream.
        let cmd = FfmpegCommand::new(clip, "/dev/null")
            .video_filter(filter)
            .output_args(["-f", "null"])
            .no_audio();
        self.run_logged(
            &cmd,
            "stabilize_detect",
            &format!("Analyze motion of {} (shakiness {})", clip.display(), params.shakiness),
        )
        .await
        .map(|_| ())
    }

    async fn stabilize_apply(
        &self,
        clip: &Path,
        trf: &Path,
        params: StabilizeParams,
        out: &Path,
    ) -> MediaResult<()> {
        let filter = format!(
            "vidstabtransform=smoothing={}:input={}:crop=black,unsharp=5:5:0.8:3:3:0.4",
            params.smoothing,
            trf.display()
        );
        let cmd = self.encoded(FfmpegCommand::new(clip, out).video_filter(filter));
        self.run_logged(
            &cmd,
            "stabilize_apply",
            &format!("Apply smoothed transforms to {} (window {})", clip.display(), params.smoothing),
        )
        .await
        .map(|_| ())
    }

    async fn apply_filter(
        &self,
        clip: &Path,
        video_filter: Option<&str>,
        audio_filter: Option<&str>,
        out: &Path,
        name: &str,
        description: &str,
    ) -> MediaResult<()> {
        let mut cmd = FfmpegCommand::new(clip, out);
        if let Some(vf) = video_filter {
            cmd = cmd.video_filter(vf);
        }
        if let Some(af) = audio_filter {
            cmd = cmd.audio_filter(af);
        }
        let cmd = self.encoded(cmd);
        self.run_logged(&cmd, name, description).await.map(|_| ())
    }

    async fn overlay_composite(
        &self,
        clip: &Path,
        asset: &Path,
        filter_complex: &str,
        out: &Path,
        description: &str,
    ) -> MediaResult<()> {
        let cmd = self.encoded(
            FfmpegCommand::new(clip, out)
                .extra_input(asset)
                .filter_complex(filter_complex),
        );
        self.run_logged(&cmd, "overlay", description).await.map(|_| ())
    }

    async fn render_overlay_asset(&self, spec: &OverlayAssetSpec, out: &Path) -> MediaResult<()> {
        let mut filter = String::new();
        let line_height = spec.height as f64 / (spec.lines.len().max(1) as f64 + 1.0);
        for (i, line) in spec.lines.iter().enumerate() {
            if i > 0 {
                filter.push(',');
            }
            filter.push_str(&format!(
                "drawtext=text='{}':fontcolor=white:fontsize={}:x=(w-text_w)/2:y={:.0}",
                escape_drawtext(line),
                (line_height * 0.6).round() as u32,
                line_height * (i as f64 + 0.7),
            ));
        }

        let color_src = match spec.duration_secs {
            Some(d) => format!("color=c={}:s={}x{}:d={:.3}", spec.background, spec.width, spec.height, d),
            None => format!("color=c={}:s={}x{}:d=0.04", spec.background, spec.width, spec.height),
        };

        let mut cmd = FfmpegCommand::source_less(out)
            .input_args(["-f", "lavfi"])
            .input_arg("-i")
            .input_arg(color_src);

        if let Some(d) = spec.duration_secs {
            // Slates are standalone segments: attach silent audio so
            // they concatenate with real clips.
            cmd = cmd
                .input_args(["-f", "lavfi", "-i", "anullsrc=channel_layout=mono:sample_rate=48000"])
                .output_args(["-t", &format!("{:.3}", d)])
                .output_args(["-c:v", "libx264", "-crf", "18", "-preset", "medium"])
                .output_args(["-c:a", "aac"]);
            if !filter.is_empty() {
                cmd = cmd.video_filter(filter);
            }
        } else {
            cmd = cmd.output_args(["-frames:v", "1"]);
            if !filter.is_empty() {
                cmd = cmd.video_filter(filter);
            }
        }

        self.run_logged(
            &cmd,
            "render_overlay_asset",
            &format!("Render {}-line graphic to {}", spec.lines.len(), out.display()),
        )
        .await
        .map(|_| ())
    }

    async fn time_stretch(&self, clip: &Path, factor: f64, out: &Path) -> MediaResult<()> {
        let cmd = self.encoded(
            FfmpegCommand::new(clip, out)
                .video_filter(crate::filters::slowmo_video_filter(factor))
                .audio_filter(crate::filters::slowmo_audio_filter(factor)),
        );
        self.run_logged(
            &cmd,
            "time_stretch",
            &format!("Time-stretch {} to {:.0}% speed", clip.display(), factor * 100.0),
        )
        .await
        .map(|_| ())
    }

    async fn measure_loudness(&self, media: &Path, filter: &str) -> MediaResult<LoudnessStats> {
        let cmd = FfmpegCommand::new(media, "/dev/null")
            .log_level("info")
            .audio_filter(filter)
            .output_args(["-f", "null"])
            .no_video();
        let stderr = self
            .run_logged(
                &cmd,
                "measure_loudness",
                &format!("Measure integrated loudness of {}", media.display()),
            )
            .await?;
        parse_loudnorm_stats(&stderr)
    }

    async fn apply_loudnorm(&self, media: &Path, filter: &str, out: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(media, out)
            .audio_filter(filter)
            .output_args(["-c:v", "copy"])
            .audio_codec("aac");
        self.run_logged(
            &cmd,
            "apply_loudnorm",
            &format!("Apply loudness correction to {}", media.display()),
        )
        .await
        .map(|_| ())
    }

    async fn concat(&self, clips: &[PathBuf], out: &Path) -> MediaResult<()> {
        if clips.is_empty() {
            return Err(MediaError::internal("nothing to concatenate"));
        }

        let list_path = out.with_extension("concat.txt");
        let mut list = String::new();
        for clip in clips {
            list.push_str(&format!("file '{}'\n", clip.display()));
        }
        std::fs::write(&list_path, list)?;

        let cmd = FfmpegCommand::new(&list_path, out)
            .input_args(["-f", "concat", "-safe", "0"])
            .output_args(["-c", "copy"]);
        self.run_logged(
            &cmd,
            "concat",
            &format!("Concatenate {} segments into {}", clips.len(), out.display()),
        )
        .await
        .map(|_| ())
    }

    async fn run_tool(
        &self,
        argv: &[String],
        name: &str,
        description: &str,
    ) -> MediaResult<String> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| MediaError::internal("empty tool command"))?;

        self.log.record(name, description, program, args)?;

        let mut command = tokio::process::Command::new(program);
        command.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let run = async {
            let output = command.output().await?;
            if !output.status.success() {
                return Err(MediaError::tool_failed(
                    program.clone(),
                    String::from_utf8_lossy(&output.stderr).to_string(),
                ));
            }
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        };

        match self.timeout_secs {
            Some(secs) => {
                tokio::time::timeout(std::time::Duration::from_secs(secs), run)
                    .await
                    .map_err(|_| MediaError::Timeout(secs))?
            }
            None => run.await,
        }
    }
}

/// Parse `metadata=print` output into (pts_time, YDIF) pairs.
fn parse_signalstats(text: &str) -> Vec<(f64, f64)> {
    let mut out = Vec::new();
    let mut current_time: Option<f64> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with("frame:") {
            current_time = line
                .split_whitespace()
                .find_map(|tok| tok.strip_prefix("pts_time:"))
                .and_then(|v| v.parse().ok());
        } else if let Some(value) = line.strip_prefix("lavfi.signalstats.YDIF=") {
            if let (Some(t), Ok(v)) = (current_time, value.parse::<f64>()) {
                out.push((t, v));
            }
        }
    }
    out
}

/// Escape text for an ffmpeg drawtext parameter.
fn escape_drawtext(text: &str) -> String {
    text.replace('\\', r"\\")
        .replace('\'', r"\'")
        .replace(':', r"\:")
        .replace('%', r"\%")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_log() -> (Arc<ReproductionLog>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let log = ReproductionLog::create(tmp.path()).unwrap();
        (Arc::new(log), tmp)
    }

    #[test]
    fn test_parse_signalstats() {
        let text = "\
frame:0    pts:0      pts_time:0\n\
lavfi.signalstats.YDIF=0.000000\n\
frame:1    pts:1024   pts_time:0.5\n\
lavfi.signalstats.YDIF=7.312500\n\
frame:2    pts:2048   pts_time:1\n\
lavfi.signalstats.YDIF=2.100000\n";
        let stats = parse_signalstats(text);
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[1].0, 0.5);
        assert!((stats[1].1 - 7.3125).abs() < 1e-9);
    }

    #[test]
    fn test_escape_drawtext() {
        assert_eq!(escape_drawtext("2 - 1"), "2 - 1");
        assert_eq!(escape_drawtext("RIV: 2"), r"RIV\: 2");
        assert_eq!(escape_drawtext("it's"), r"it\'s");
    }

    #[tokio::test]
    async fn test_run_tool_rejects_empty_argv() {
        let (log, _tmp) = test_log();
        let ops = FfmpegOps::new(log);
        let err = ops.run_tool(&[], "detector", "run detector").await.unwrap_err();
        assert!(matches!(err, MediaError::Internal(_)));
    }

    #[tokio::test]
    async fn test_concat_rejects_empty_input() {
        let (log, _tmp) = test_log();
        let ops = FfmpegOps::new(log);
        let err = ops
            .concat(&[], Path::new("/tmp/out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Internal(_)));
    }

    #[test]
    fn test_overlay_asset_spec_slate_is_video() {
        let spec = OverlayAssetSpec {
            width: 1920,
            height: 1080,
            background: "black".to_string(),
            lines: vec!["RIV vs ASH".to_string(), "2 - 1".to_string()],
            duration_secs: Some(4.0),
        };
        assert!(spec.duration_secs.is_some());
        assert_eq!(spec.lines.len(), 2);
    }
}
