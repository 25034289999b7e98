//! Vertical short-form retargeting.
//!
//! Each qualifying clip is re-cropped to portrait around the action
//! center and re-overlaid with a vertical-safe layout. A clip without
//! detector boxes falls back to a center crop instead of failing.

use std::path::{Path, PathBuf};

use reel_media::filters::vertical_crop_filter;
use reel_media::{MediaOps, OverlayAssetSpec};
use reel_models::config::RenderConfig;
use reel_models::event::FusedEvent;
use reel_models::job::ShortArtifact;
use reel_models::plan::{ClipPlan, OverlaySpec, ShortTarget};
use reel_models::MatchDescriptor;

use crate::error::PipelineResult;

const VERTICAL_MARGIN: u32 = 48;

pub struct ShortsRenderer<'a> {
    ops: &'a dyn MediaOps,
    config: &'a RenderConfig,
    descriptor: &'a MatchDescriptor,
}

impl<'a> ShortsRenderer<'a> {
    pub fn new(
        ops: &'a dyn MediaOps,
        config: &'a RenderConfig,
        descriptor: &'a MatchDescriptor,
    ) -> Self {
        Self {
            ops,
            config,
            descriptor,
        }
    }

    /// Render one vertical short from an effects-processed clip.
    pub async fn render(
        &self,
        clip: &Path,
        plan: &ClipPlan,
        event: &FusedEvent,
        target: ShortTarget,
        work_dir: &Path,
        index: usize,
    ) -> PipelineResult<ShortArtifact> {
        let cx = action_center(event, self.config.effects.zoom_tolerance_secs);

        let cropped = work_dir.join(format!("short_{:02}_cropped.mp4", index));
        self.ops
            .apply_filter(
                clip,
                Some(&vertical_crop_filter(target.width, target.height, cx)),
                None,
                &cropped,
                "vertical_crop",
                &format!(
                    "Crop to {}x{} centered at {:.2}",
                    target.width, target.height, cx
                ),
            )
            .await?;

        let overlaid = self
            .reoverlay(&cropped, plan, target, work_dir, index)
            .await?;

        let duration_secs = self.ops.probe(&overlaid).await.map(|i| i.duration)?;
        Ok(ShortArtifact {
            path: overlaid.display().to_string(),
            event_index: plan.event_index,
            event_headline: event.kind.headline(),
            duration_secs,
        })
    }

    /// Re-apply the plan's overlays with a portrait-safe layout.
    async fn reoverlay(
        &self,
        clip: &Path,
        plan: &ClipPlan,
        target: ShortTarget,
        work_dir: &Path,
        index: usize,
    ) -> PipelineResult<PathBuf> {
        let mut current = clip.to_path_buf();
        let graphic_width = target.width - 2 * VERTICAL_MARGIN;

        for (layer, overlay) in plan.overlays.iter().enumerate() {
            let out = work_dir.join(format!("short_{:02}_ovl{}.mp4", index, layer));
            match overlay {
                OverlaySpec::Scoreboard {
                    home_goals,
                    away_goals,
                } => {
                    let asset = work_dir.join(format!("short_scoreboard_{}_{}.png", home_goals, away_goals));
                    self.ops
                        .render_overlay_asset(
                            &OverlayAssetSpec {
                                width: graphic_width,
                                height: 72,
                                background: "black@0.65".to_string(),
                                lines: vec![format!(
                                    "{} {} - {} {}",
                                    self.descriptor.home.short_code,
                                    home_goals,
                                    away_goals,
                                    self.descriptor.away.short_code
                                )],
                                duration_secs: None,
                            },
                            &asset,
                        )
                        .await?;
                    self.ops
                        .overlay_composite(
                            &current,
                            &asset,
                            &format!("[0:v][1:v]overlay=(main_w-overlay_w)/2:{}", VERTICAL_MARGIN),
                            &out,
                            "Vertical scoreboard",
                        )
                        .await?;
                }
                OverlaySpec::LowerThird { text, .. } => {
                    // Shorts keep the caption up for the full clip.
                    let asset = work_dir.join(format!("short_{:02}_lt.png", index));
                    self.ops
                        .render_overlay_asset(
                            &OverlayAssetSpec {
                                width: graphic_width,
                                height: 110,
                                background: "black@0.7".to_string(),
                                lines: vec![text.clone()],
                                duration_secs: None,
                            },
                            &asset,
                        )
                        .await?;
                    self.ops
                        .overlay_composite(
                            &current,
                            &asset,
                            &format!(
                                "[0:v][1:v]overlay=(main_w-overlay_w)/2:main_h-overlay_h-{}",
                                VERTICAL_MARGIN * 3
                            ),
                            &out,
                            "Vertical caption",
                        )
                        .await?;
                }
            }
            current = out;
        }
        Ok(current)
    }
}

/// Normalized horizontal action center from the event's detections,
/// falling back to frame center when no box is near the event.
fn action_center(event: &FusedEvent, tolerance_secs: f64) -> f64 {
    event
        .nearest_bbox(event.timestamp_secs, tolerance_secs.max(1.0))
        .map(|b| b.cx())
        .unwrap_or(0.5)
}
