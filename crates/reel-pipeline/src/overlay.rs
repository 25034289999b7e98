//! Overlay compositor: scoreboard, event lower-thirds, slates.
//!
//! Graphics are rendered once per job and cached by their content key,
//! then composited per clip. Scoreboards persist for a clip's full
//! length; lower-thirds fade in and out around the event's in-clip
//! offset; slates are standalone full-frame segments concatenated
//! around the clip sequence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use reel_media::filters::fade_envelope_filter;
use reel_media::{MediaOps, OverlayAssetSpec};
use reel_models::config::OverlayConfig;
use reel_models::plan::{ClipPlan, OverlaySpec};
use reel_models::MatchDescriptor;

use crate::error::PipelineResult;

const SCOREBOARD_WIDTH: u32 = 520;
const SCOREBOARD_HEIGHT: u32 = 80;
const SCOREBOARD_MARGIN: u32 = 24;
const LOWER_THIRD_HEIGHT: u32 = 120;
const LOWER_THIRD_BOTTOM_MARGIN: u32 = 96;

/// Per-job cache of rendered graphics, keyed by content.
#[derive(Default)]
pub struct AssetCache {
    assets: HashMap<String, PathBuf>,
}

impl AssetCache {
    async fn get_or_render(
        &mut self,
        ops: &dyn MediaOps,
        key: String,
        spec: OverlayAssetSpec,
        out: PathBuf,
    ) -> PipelineResult<PathBuf> {
        if let Some(path) = self.assets.get(&key) {
            return Ok(path.clone());
        }
        ops.render_overlay_asset(&spec, &out).await?;
        self.assets.insert(key, out.clone());
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

pub struct OverlayCompositor<'a> {
    ops: &'a dyn MediaOps,
    config: &'a OverlayConfig,
    descriptor: &'a MatchDescriptor,
}

impl<'a> OverlayCompositor<'a> {
    pub fn new(
        ops: &'a dyn MediaOps,
        config: &'a OverlayConfig,
        descriptor: &'a MatchDescriptor,
    ) -> Self {
        Self {
            ops,
            config,
            descriptor,
        }
    }

    /// Composite the plan's overlays onto a clip, one pass per layer.
    pub async fn composite(
        &self,
        clip: &Path,
        plan: &ClipPlan,
        cache: &mut AssetCache,
        work_dir: &Path,
    ) -> PipelineResult<PathBuf> {
        let mut current = clip.to_path_buf();
        let stem = clip
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();

        for (layer, overlay) in plan.overlays.iter().enumerate() {
            let out = work_dir.join(format!("{}_ovl{}.mp4", stem, layer));
            match overlay {
                OverlaySpec::Scoreboard {
                    home_goals,
                    away_goals,
                } => {
                    let asset = self
                        .scoreboard_asset(cache, *home_goals, *away_goals, work_dir)
                        .await?;
                    self.ops
                        .overlay_composite(
                            &current,
                            &asset,
                            &scoreboard_graph(),
                            &out,
                            &format!("Scoreboard {}-{}", home_goals, away_goals),
                        )
                        .await?;
                }
                OverlaySpec::LowerThird { text, at_secs } => {
                    let asset = self.lower_third_asset(cache, text, work_dir).await?;
                    let graph = lower_third_graph(
                        *at_secs,
                        self.config.hold_secs,
                        self.config.fade_secs,
                    );
                    self.ops
                        .overlay_composite(
                            &current,
                            &asset,
                            &graph,
                            &out,
                            &format!("Lower-third \"{}\" at {:.1}s", text, at_secs),
                        )
                        .await?;
                }
            }
            current = out;
        }

        Ok(current)
    }

    async fn scoreboard_asset(
        &self,
        cache: &mut AssetCache,
        home: u32,
        away: u32,
        work_dir: &Path,
    ) -> PipelineResult<PathBuf> {
        let key = format!("scoreboard_{}_{}", home, away);
        let out = work_dir.join(format!("{}.png", key));
        let spec = OverlayAssetSpec {
            width: SCOREBOARD_WIDTH,
            height: SCOREBOARD_HEIGHT,
            background: "black@0.65".to_string(),
            lines: vec![scoreboard_text(self.descriptor, home, away)],
            duration_secs: None,
        };
        cache.get_or_render(self.ops, key, spec, out).await
    }

    async fn lower_third_asset(
        &self,
        cache: &mut AssetCache,
        text: &str,
        work_dir: &Path,
    ) -> PipelineResult<PathBuf> {
        let key = format!("lower_third_{:016x}", fxhash(text));
        let out = work_dir.join(format!("{}.mp4", key));
        let spec = OverlayAssetSpec {
            width: 960,
            height: LOWER_THIRD_HEIGHT,
            background: "black@0.7".to_string(),
            lines: vec![text.to_string()],
            // rendered as a short video so the fade envelope animates
            duration_secs: Some(self.config.hold_secs),
        };
        cache.get_or_render(self.ops, key, spec, out).await
    }

    /// Render the opening and closing slates as standalone segments.
    pub async fn slates(
        &self,
        width: u32,
        height: u32,
        work_dir: &Path,
    ) -> PipelineResult<Option<(PathBuf, PathBuf)>> {
        if !self.config.enable_slates {
            return Ok(None);
        }

        let opening = work_dir.join("slate_opening.mp4");
        self.ops
            .render_overlay_asset(
                &OverlayAssetSpec {
                    width,
                    height,
                    background: "black".to_string(),
                    lines: opening_slate_lines(self.descriptor),
                    duration_secs: Some(self.config.slate_secs),
                },
                &opening,
            )
            .await?;

        let closing = work_dir.join("slate_closing.mp4");
        self.ops
            .render_overlay_asset(
                &OverlayAssetSpec {
                    width,
                    height,
                    background: "black".to_string(),
                    lines: closing_slate_lines(self.descriptor),
                    duration_secs: Some(self.config.slate_secs),
                },
                &closing,
            )
            .await?;

        Ok(Some((opening, closing)))
    }
}

fn scoreboard_text(descriptor: &MatchDescriptor, home: u32, away: u32) -> String {
    format!(
        "{} {} - {} {}",
        descriptor.home.short_code, home, away, descriptor.away.short_code
    )
}

fn opening_slate_lines(descriptor: &MatchDescriptor) -> Vec<String> {
    let mut lines = vec![
        descriptor.competition.clone(),
        format!("{} vs {}", descriptor.home.name, descriptor.away.name),
        descriptor.date.clone(),
    ];
    if let Some(venue) = &descriptor.venue {
        lines.push(venue.clone());
    }
    lines
}

fn closing_slate_lines(descriptor: &MatchDescriptor) -> Vec<String> {
    let mut lines = vec![
        "FULL TIME".to_string(),
        format!("{} {}", descriptor.fixture_label(), descriptor.final_score),
    ];
    if let Some(motm) = &descriptor.man_of_the_match {
        lines.push(format!("Man of the Match: {}", motm));
    }
    lines.push("Like and subscribe for more highlights".to_string());
    lines
}

/// Compositing graph for the persistent scoreboard. The single-frame
/// asset repeats for the clip's full length.
fn scoreboard_graph() -> String {
    format!(
        "[0:v][1:v]overlay={m}:{m}",
        m = SCOREBOARD_MARGIN
    )
}

/// Compositing graph for a timed lower-third: shift the asset to the
/// event offset, fade its alpha, and enable it only for its window.
fn lower_third_graph(at_secs: f64, hold_secs: f64, fade_secs: f64) -> String {
    format!(
        "[1:v]setpts=PTS+{at:.3}/TB,{fade}[lt];\
         [0:v][lt]overlay=(main_w-overlay_w)/2:main_h-overlay_h-{margin}:\
         enable='between(t,{at:.3},{end:.3})'",
        at = at_secs,
        fade = fade_envelope_filter(at_secs, hold_secs, fade_secs),
        margin = LOWER_THIRD_BOTTOM_MARGIN,
        end = at_secs + hold_secs,
    )
}

/// Reel-time ranges covered by lower-thirds and slates, for ducking.
///
/// `clip_durations[i]` is the final duration of `plans[i]`'s clip;
/// `slate_secs` is the opening slate length when present.
pub fn duck_ranges(
    plans: &[ClipPlan],
    clip_durations: &[f64],
    opening_slate_secs: Option<f64>,
    closing_slate_secs: Option<f64>,
    hold_secs: f64,
) -> Vec<(f64, f64)> {
    let mut ranges = Vec::new();
    let mut offset = 0.0;

    if let Some(slate) = opening_slate_secs {
        ranges.push((0.0, slate));
        offset += slate;
    }

    for (plan, &duration) in plans.iter().zip(clip_durations) {
        for overlay in &plan.overlays {
            if let OverlaySpec::LowerThird { at_secs, .. } = overlay {
                let start = offset + at_secs;
                let end = (start + hold_secs).min(offset + duration);
                if end > start {
                    ranges.push((start, end));
                }
            }
        }
        offset += duration;
    }

    if let Some(slate) = closing_slate_secs {
        ranges.push((offset, offset + slate));
    }
    ranges
}

/// Stable non-cryptographic hash for asset cache keys.
fn fxhash(text: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in text.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}
