//! Recording fake for `MediaOps`, used by stage and pipeline tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use reel_media::{
    LoudnessStats, MediaError, MediaOps, MediaResult, OverlayAssetSpec, StabilizeParams,
    VideoInfo,
};
use reel_models::plan::TimeRange;

/// One recorded fake invocation.
#[derive(Debug, Clone)]
pub struct FakeOp {
    pub name: String,
    pub detail: String,
}

/// In-memory `MediaOps` that records every call, materializes empty
/// output files, and returns configurable canned results.
pub struct FakeMediaOps {
    pub info: VideoInfo,
    pub loudness: LoudnessStats,
    pub motion: Vec<(f64, f64)>,
    /// Raw s16le bytes returned by `extract_audio`
    pub audio_pcm: Vec<u8>,
    tool_stdout: Mutex<HashMap<String, String>>,
    fail_remaining: Mutex<HashMap<String, u32>>,
    probe_delay: Mutex<Option<Duration>>,
    ops: Mutex<Vec<FakeOp>>,
}

impl FakeMediaOps {
    pub fn new() -> Self {
        Self {
            info: VideoInfo {
                duration: 5400.0,
                width: 1920,
                height: 1080,
                fps: 30.0,
                codec: "h264".to_string(),
                has_audio: true,
                sample_rate: 48000,
            },
            loudness: LoudnessStats {
                input_i: -23.5,
                input_tp: -6.3,
                input_lra: 14.1,
                input_thresh: -34.1,
                target_offset: -0.04,
            },
            motion: Vec::new(),
            audio_pcm: Vec::new(),
            tool_stdout: Mutex::new(HashMap::new()),
            fail_remaining: Mutex::new(HashMap::new()),
            probe_delay: Mutex::new(None),
            ops: Mutex::new(Vec::new()),
        }
    }

    /// Canned stdout for a `run_tool` invocation by operation name.
    pub fn set_tool_stdout(&self, name: &str, stdout: &str) {
        self.tool_stdout
            .lock()
            .unwrap()
            .insert(name.to_string(), stdout.to_string());
    }

    /// Stall every `probe` call for `delay`. Probing is the first media
    /// operation of a job, so this holds the whole pipeline, letting
    /// timeout paths fire deterministically.
    pub fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.lock().unwrap() = Some(delay);
    }

    /// Make the named operation fail its next `times` invocations.
    pub fn fail_times(&self, name: &str, times: u32) {
        self.fail_remaining
            .lock()
            .unwrap()
            .insert(name.to_string(), times);
    }

    pub fn operations(&self) -> Vec<FakeOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn operation_names(&self) -> Vec<String> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .map(|op| op.name.clone())
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.name == name)
            .count()
    }

    fn record(&self, name: &str, detail: impl Into<String>) -> MediaResult<()> {
        self.ops.lock().unwrap().push(FakeOp {
            name: name.to_string(),
            detail: detail.into(),
        });

        let mut failures = self.fail_remaining.lock().unwrap();
        if let Some(remaining) = failures.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MediaError::ffmpeg_failed(
                    format!("injected {} failure", name),
                    None,
                    Some(1),
                ));
            }
        }
        Ok(())
    }

    fn touch(path: &Path) -> MediaResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"")?;
        Ok(())
    }
}

impl Default for FakeMediaOps {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaOps for FakeMediaOps {
    async fn probe(&self, source: &Path) -> MediaResult<VideoInfo> {
        let delay = *self.probe_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record("probe", source.display().to_string())?;
        Ok(self.info.clone())
    }

    async fn extract_segment(
        &self,
        _source: &Path,
        range: TimeRange,
        out: &Path,
    ) -> MediaResult<()> {
        self.record(
            "extract_segment",
            format!("{:.2}..{:.2} -> {}", range.start_secs, range.end_secs, out.display()),
        )?;
        Self::touch(out)
    }

    async fn extract_audio(&self, _source: &Path, sample_rate: u32, out: &Path) -> MediaResult<()> {
        self.record("extract_audio", format!("{} Hz", sample_rate))?;
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(out, &self.audio_pcm)?;
        Ok(())
    }

    async fn sample_frames(
        &self,
        _source: &Path,
        fps: f64,
        region: Option<(f64, f64, f64, f64)>,
        out_dir: &Path,
    ) -> MediaResult<Vec<PathBuf>> {
        self.record(
            "sample_frames",
            format!("{:.2} fps region={:?}", fps, region),
        )?;
        std::fs::create_dir_all(out_dir)?;
        Ok(Vec::new())
    }

    async fn motion_stats(
        &self,
        _source: &Path,
        fps: f64,
        _region: Option<(f64, f64, f64, f64)>,
    ) -> MediaResult<Vec<(f64, f64)>> {
        self.record("motion_stats", format!("{:.2} fps", fps))?;
        Ok(self.motion.clone())
    }

    async fn stabilize_detect(
        &self,
        _clip: &Path,
        params: StabilizeParams,
        trf: &Path,
    ) -> MediaResult<()> {
        self.record("stabilize_detect", format!("shakiness={}", params.shakiness))?;
        Self::touch(trf)
    }

    async fn stabilize_apply(
        &self,
        _clip: &Path,
        _trf: &Path,
        params: StabilizeParams,
        out: &Path,
    ) -> MediaResult<()> {
        self.record("stabilize_apply", format!("smoothing={}", params.smoothing))?;
        Self::touch(out)
    }

    async fn apply_filter(
        &self,
        _clip: &Path,
        video_filter: Option<&str>,
        audio_filter: Option<&str>,
        out: &Path,
        name: &str,
        _description: &str,
    ) -> MediaResult<()> {
        let detail = match (video_filter, audio_filter) {
            (Some(v), Some(a)) => format!("vf={} af={}", v, a),
            (Some(v), None) => format!("vf={}", v),
            (None, Some(a)) => format!("af={}", a),
            (None, None) => String::new(),
        };
        self.record(name, detail)?;
        Self::touch(out)
    }

    async fn overlay_composite(
        &self,
        _clip: &Path,
        asset: &Path,
        filter_complex: &str,
        out: &Path,
        _description: &str,
    ) -> MediaResult<()> {
        self.record(
            "overlay",
            format!("asset={} graph={}", asset.display(), filter_complex),
        )?;
        Self::touch(out)
    }

    async fn render_overlay_asset(&self, spec: &OverlayAssetSpec, out: &Path) -> MediaResult<()> {
        self.record("render_overlay_asset", spec.lines.join(" | "))?;
        Self::touch(out)
    }

    async fn time_stretch(&self, _clip: &Path, factor: f64, out: &Path) -> MediaResult<()> {
        self.record("time_stretch", format!("factor={:.2}", factor))?;
        Self::touch(out)
    }

    async fn measure_loudness(&self, _media: &Path, filter: &str) -> MediaResult<LoudnessStats> {
        self.record("measure_loudness", filter)?;
        Ok(self.loudness.clone())
    }

    async fn apply_loudnorm(&self, _media: &Path, filter: &str, out: &Path) -> MediaResult<()> {
        self.record("apply_loudnorm", filter)?;
        Self::touch(out)
    }

    async fn concat(&self, clips: &[PathBuf], out: &Path) -> MediaResult<()> {
        let detail = clips
            .iter()
            .map(|c| c.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.record("concat", detail)?;
        Self::touch(out)
    }

    async fn run_tool(
        &self,
        argv: &[String],
        name: &str,
        _description: &str,
    ) -> MediaResult<String> {
        self.record(name, argv.join(" "))?;
        Ok(self
            .tool_stdout
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}
