//! Immutable pipeline configuration.
//!
//! One `RenderConfig` value is built at job submission and threaded
//! through every stage constructor; no stage reads ambient state.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::event::SignalSource;
use crate::plan::{ContextWindow, Effect};

/// Signal extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SignalConfig {
    /// Enabled extractors. Ground truth is always consumed when supplied.
    pub enable_object_detector: bool,
    pub enable_audio_energy: bool,
    pub enable_tonal: bool,
    pub enable_motion_burst: bool,
    pub enable_ocr: bool,

    /// Per-source fusion weight overrides; unlisted sources use
    /// `SignalSource::default_weight`.
    pub weights: HashMap<SignalSource, f64>,

    /// Audio-energy window length in milliseconds
    pub audio_window_ms: u64,
    /// Z-score threshold for an audio-energy candidate
    pub audio_z_threshold: f64,
    /// Minimum consecutive windows above threshold (dwell)
    pub audio_min_dwell_windows: usize,

    /// Whistle band in Hz (low, high)
    pub tonal_band_hz: (f64, f64),
    /// Band-to-total energy ratio threshold
    pub tonal_ratio_threshold: f64,
    /// Adjacent tonal detections within this gap merge into one candidate
    pub tonal_merge_gap_secs: f64,

    /// Frame sampling rate for visual passes, frames per second
    pub frame_sample_fps: f64,
    /// Mean flow magnitude threshold for a motion burst
    pub motion_threshold: f64,
    /// Adjacent motion bursts within this gap merge into one candidate
    pub motion_merge_gap_secs: f64,
    /// Region of interest for motion analysis, normalized (x, y, w, h)
    pub motion_roi: (f64, f64, f64, f64),

    /// External object-detector command (argv); receives a frame
    /// directory and writes JSON-lines detections to stdout
    pub detector_command: Vec<String>,
    /// External OCR command (argv) for the scoreboard region
    pub ocr_command: Vec<String>,
    /// Scoreboard region for OCR, normalized (x, y, w, h)
    pub ocr_region: (f64, f64, f64, f64),
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            enable_object_detector: true,
            enable_audio_energy: true,
            enable_tonal: true,
            enable_motion_burst: true,
            enable_ocr: false,
            weights: HashMap::new(),
            audio_window_ms: 200,
            audio_z_threshold: 2.0,
            audio_min_dwell_windows: 3,
            tonal_band_hz: (3500.0, 4500.0),
            tonal_ratio_threshold: 0.35,
            tonal_merge_gap_secs: 0.5,
            frame_sample_fps: 2.0,
            motion_threshold: 6.0,
            motion_merge_gap_secs: 2.0,
            motion_roi: (0.0, 0.25, 1.0, 0.5),
            detector_command: Vec::new(),
            ocr_command: Vec::new(),
            ocr_region: (0.02, 0.02, 0.25, 0.08),
        }
    }
}

impl SignalConfig {
    /// Effective fusion weight for a source.
    pub fn weight(&self, source: SignalSource) -> f64 {
        self.weights
            .get(&source)
            .copied()
            .unwrap_or_else(|| source.default_weight())
    }
}

/// Fusion merge and classification policy.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FusionConfig {
    /// Candidate bucket size, seconds
    pub bucket_secs: f64,
    /// Maximum gap between bucket centers that still merges, seconds
    pub merge_gap_secs: f64,
    /// Minimum fused score to classify an unlabeled event as a chance
    pub chance_threshold: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            bucket_secs: 1.0,
            merge_gap_secs: 5.0,
            chance_threshold: 3.0,
        }
    }
}

/// Event selection cutoffs. Both bounds are optional; when neither is
/// set every fused event is selected.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(default)]
pub struct SelectionConfig {
    /// Drop fused events scoring below this (ground-truth-backed events
    /// are exempt)
    pub min_score: Option<f64>,
    /// Keep at most this many events, in rank order
    pub max_events: Option<usize>,
}

/// Effects engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EffectsConfig {
    /// vidstab shakiness sensitivity (1-10)
    pub stab_shakiness: u8,
    /// Transform smoothing window, frames
    pub stab_smoothing: u32,
    /// Relaxed shakiness used for the single retry
    pub stab_shakiness_relaxed: u8,

    /// Dynamic framing zoom factor; crop window is frame/zoom
    pub zoom_factor: f64,
    /// Maximum bbox age for dynamic framing, seconds; beyond this the
    /// frame passes through unzoomed
    pub zoom_tolerance_secs: f64,

    /// Slow-motion speed factor (0.65 = 65% speed)
    pub slowmo_factor: f64,
    /// Seconds before/after the peak moment included in the replay
    pub slowmo_bracket_secs: f64,
    /// Optional transition asset inserted around the replay
    pub transition_asset: Option<String>,

    /// Per-event-kind effect list overrides; unlisted kinds use the
    /// built-in table
    pub kind_effects: HashMap<String, Vec<Effect>>,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            stab_shakiness: 5,
            stab_smoothing: 10,
            stab_shakiness_relaxed: 3,
            zoom_factor: 1.5,
            zoom_tolerance_secs: 1.0,
            slowmo_factor: 0.65,
            slowmo_bracket_secs: 3.0,
            transition_asset: None,
            kind_effects: HashMap::new(),
        }
    }
}

impl EffectsConfig {
    /// Effect list for an event kind name ("goal", "chance", ...).
    /// Stabilization applies everywhere by default; the heavier
    /// treatments go to the moments that carry the reel.
    pub fn effects_for(&self, kind_name: &str) -> Vec<Effect> {
        if let Some(effects) = self.kind_effects.get(kind_name) {
            return effects.clone();
        }
        match kind_name {
            "goal" => vec![
                Effect::Stabilize,
                Effect::DynamicFraming,
                Effect::SlowMotion,
            ],
            "chance" => vec![Effect::Stabilize, Effect::DynamicFraming],
            _ => vec![Effect::Stabilize],
        }
    }
}

/// Overlay compositor parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct OverlayConfig {
    pub enable_scoreboard: bool,
    pub enable_lower_thirds: bool,
    pub enable_slates: bool,
    /// Lower-third fade in/out, seconds
    pub fade_secs: f64,
    /// Lower-third hold duration, seconds
    pub hold_secs: f64,
    /// Opening/closing slate duration, seconds
    pub slate_secs: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enable_scoreboard: true,
            enable_lower_thirds: true,
            enable_slates: true,
            fade_secs: 0.3,
            hold_secs: 3.0,
            slate_secs: 4.0,
        }
    }
}

/// Audio mastering parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AudioConfig {
    /// Integrated loudness target, LUFS
    pub target_lufs: f64,
    /// True peak ceiling, dBTP
    pub true_peak_db: f64,
    /// Loudness range target, LU
    pub target_lra: f64,
    /// Attenuation under lower-thirds and slates, dB (positive value)
    pub duck_db: f64,
    /// Duck fade edge length, seconds
    pub duck_fade_secs: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            target_lufs: -14.0,
            true_peak_db: -1.5,
            target_lra: 11.0,
            duck_db: 3.0,
            duck_fade_secs: 0.15,
        }
    }
}

/// Export fan-out targets.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ExportConfig {
    /// Produce the long-form highlight reel
    pub reel: bool,
    /// Number of vertical shorts to produce (top-ranked events first)
    pub shorts_count: usize,
    /// Vertical short geometry
    pub short_width: u32,
    pub short_height: u32,
    /// Emit the SRT subtitle track
    pub subtitles: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            reel: true,
            shorts_count: 3,
            short_width: 1080,
            short_height: 1920,
            subtitles: true,
        }
    }
}

/// Complete, immutable configuration for one render job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(default)]
pub struct RenderConfig {
    pub signals: SignalConfig,
    pub fusion: FusionConfig,
    pub selection: SelectionConfig,
    /// Per-event-kind context windows; unlisted kinds use
    /// `ContextWindow::default`
    pub context_windows: HashMap<String, ContextWindow>,
    pub effects: EffectsConfig,
    pub overlays: OverlayConfig,
    pub audio: AudioConfig,
    pub export: ExportConfig,
}

impl RenderConfig {
    /// Context window for an event kind name ("goal", "chance", ...).
    pub fn context_window(&self, kind_name: &str) -> ContextWindow {
        if let Some(w) = self.context_windows.get(kind_name) {
            return *w;
        }
        match kind_name {
            "goal" => ContextWindow::new(8.0, 10.0),
            "chance" => ContextWindow::new(6.0, 6.0),
            "card" => ContextWindow::new(4.0, 6.0),
            _ => ContextWindow::default(),
        }
    }
}
