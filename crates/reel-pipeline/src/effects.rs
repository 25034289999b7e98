//! Per-clip video effects: stabilization, dynamic framing, slow-motion
//! replay splicing.
//!
//! Effects are best-effort. A failing effect is retried once with
//! relaxed parameters where it has any, then skipped; the clip that
//! entered the stage is used unchanged. Effect failures never fail the
//! job.

use std::path::{Path, PathBuf};

use reel_media::filters::{crop_track_filter, CropKeyframe};
use reel_media::{MediaOps, StabilizeParams};
use reel_models::config::EffectsConfig;
use reel_models::event::FusedEvent;
use reel_models::plan::{ClipPlan, Effect, TimeRange};

use crate::error::PipelineResult;
use crate::logging::JobLogger;

pub struct EffectsEngine<'a> {
    ops: &'a dyn MediaOps,
    config: &'a EffectsConfig,
    logger: JobLogger,
}

impl<'a> EffectsEngine<'a> {
    pub fn new(ops: &'a dyn MediaOps, config: &'a EffectsConfig, logger: JobLogger) -> Self {
        Self {
            ops,
            config,
            logger,
        }
    }

    /// Apply the plan's effects to an extracted clip, returning the path
    /// of the processed clip (the input path when every effect skipped).
    pub async fn apply(
        &self,
        clip: &Path,
        plan: &ClipPlan,
        event: &FusedEvent,
        work_dir: &Path,
    ) -> PipelineResult<PathBuf> {
        let mut current = clip.to_path_buf();

        for effect in &plan.effects {
            let next = match effect {
                Effect::Stabilize => self.stabilize(&current, work_dir).await,
                Effect::DynamicFraming => {
                    self.dynamic_framing(&current, plan, event, work_dir).await
                }
                Effect::SlowMotion => self.slow_motion(&current, plan, event, work_dir).await,
            };
            if let Some(path) = next {
                current = path;
            }
        }

        Ok(current)
    }

    /// Two-pass stabilization, once at full sensitivity, once relaxed.
    async fn stabilize(&self, clip: &Path, work_dir: &Path) -> Option<PathBuf> {
        let full = StabilizeParams {
            shakiness: self.config.stab_shakiness,
            smoothing: self.config.stab_smoothing,
        };
        let relaxed = StabilizeParams {
            shakiness: self.config.stab_shakiness_relaxed,
            ..full
        };

        for (attempt, params) in [full, relaxed].into_iter().enumerate() {
            match self.stabilize_once(clip, params, work_dir, attempt).await {
                Ok(out) => return Some(out),
                Err(e) => self.logger.warning(&format!(
                    "stabilization attempt {} failed (shakiness {}): {}",
                    attempt + 1,
                    params.shakiness,
                    e
                )),
            }
        }
        self.logger
            .warning("stabilization skipped, using unstabilized clip");
        None
    }

    async fn stabilize_once(
        &self,
        clip: &Path,
        params: StabilizeParams,
        work_dir: &Path,
        attempt: usize,
    ) -> PipelineResult<PathBuf> {
        let stem = clip.file_stem().unwrap_or_default().to_string_lossy();
        let trf = work_dir.join(format!("{}_a{}.trf", stem, attempt));
        let out = work_dir.join(format!("{}_stab{}.mp4", stem, attempt));
        self.ops.stabilize_detect(clip, params, &trf).await?;
        self.ops.stabilize_apply(clip, &trf, params, &out).await?;
        Ok(out)
    }

    /// Action-centered zoom following the detector's bounding boxes.
    /// Skipped when the event carries no usable boxes.
    async fn dynamic_framing(
        &self,
        clip: &Path,
        plan: &ClipPlan,
        event: &FusedEvent,
        work_dir: &Path,
    ) -> Option<PathBuf> {
        let keyframes = crop_track(event, &plan.source_range, self.config.zoom_factor);
        let filter = crop_track_filter(&keyframes, self.config.zoom_factor)?;

        let stem = clip.file_stem().unwrap_or_default().to_string_lossy();
        let out = work_dir.join(format!("{}_framed.mp4", stem));
        match self
            .ops
            .apply_filter(
                clip,
                Some(&filter),
                None,
                &out,
                "dynamic_framing",
                &format!(
                    "Zoom {}x following {} framing keyframes",
                    self.config.zoom_factor,
                    keyframes.len()
                ),
            )
            .await
        {
            Ok(()) => Some(out),
            Err(e) => {
                self.logger
                    .warning(&format!("dynamic framing skipped: {}", e));
                None
            }
        }
    }

    /// Slow-motion replay splice: re-insert a time-stretched bracket
    /// around the peak moment, optionally wrapped in transition assets.
    async fn slow_motion(
        &self,
        clip: &Path,
        plan: &ClipPlan,
        event: &FusedEvent,
        work_dir: &Path,
    ) -> Option<PathBuf> {
        let duration = plan.source_range.duration_secs();
        let peak = (event.timestamp_secs - plan.source_range.start_secs).clamp(0.0, duration);
        let (pre, slow, post) = splice_ranges(duration, peak, self.config.slowmo_bracket_secs)?;

        match self
            .splice(clip, pre, slow, post, work_dir)
            .await
        {
            Ok(out) => Some(out),
            Err(e) => {
                self.logger
                    .warning(&format!("slow-motion splice skipped: {}", e));
                None
            }
        }
    }

    async fn splice(
        &self,
        clip: &Path,
        pre: Option<TimeRange>,
        slow: TimeRange,
        post: Option<TimeRange>,
        work_dir: &Path,
    ) -> PipelineResult<PathBuf> {
        let stem = clip
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        let mut segments: Vec<PathBuf> = Vec::new();
        let transition = self.config.transition_asset.as_ref().map(PathBuf::from);

        if let Some(range) = pre {
            let path = work_dir.join(format!("{}_pre.mp4", stem));
            self.ops.extract_segment(clip, range, &path).await?;
            segments.push(path);
        }
        if let Some(t) = &transition {
            segments.push(t.clone());
        }

        let raw = work_dir.join(format!("{}_peak.mp4", stem));
        self.ops.extract_segment(clip, slow, &raw).await?;
        let stretched = work_dir.join(format!("{}_slow.mp4", stem));
        self.ops
            .time_stretch(&raw, self.config.slowmo_factor, &stretched)
            .await?;
        segments.push(stretched);

        if let Some(t) = &transition {
            segments.push(t.clone());
        }
        if let Some(range) = post {
            let path = work_dir.join(format!("{}_post.mp4", stem));
            self.ops.extract_segment(clip, range, &path).await?;
            segments.push(path);
        }

        let out = work_dir.join(format!("{}_spliced.mp4", stem));
        self.ops.concat(&segments, &out).await?;
        Ok(out)
    }
}

/// Build a clamped framing track from the event's detections, in
/// clip-local time. The crop-window origin keeps the window fully
/// inside the frame for any box, including boxes at the frame edge.
fn crop_track(event: &FusedEvent, range: &TimeRange, zoom: f64) -> Vec<CropKeyframe> {
    if zoom <= 1.0 {
        return Vec::new();
    }
    let window = 1.0 / zoom;
    let max_origin = 1.0 - window;

    let mut keyframes: Vec<CropKeyframe> = event
        .candidates
        .iter()
        .filter(|c| range.contains(c.timestamp_secs) || c.timestamp_secs == range.end_secs)
        .filter_map(|c| c.payload.bbox.map(|b| (c.timestamp_secs, b)))
        .map(|(ts, bbox)| CropKeyframe {
            t: ts - range.start_secs,
            x: (bbox.cx() - window / 2.0).clamp(0.0, max_origin),
            y: (bbox.cy() - window / 2.0).clamp(0.0, max_origin),
        })
        .collect();

    keyframes.sort_by(|a, b| a.t.partial_cmp(&b.t).unwrap_or(std::cmp::Ordering::Equal));
    keyframes.dedup_by(|a, b| (a.t - b.t).abs() < 1e-6);
    keyframes
}

/// Split a clip-local timeline around the peak into pre / slow / post
/// ranges. Returns None when the clip is too short to splice.
fn splice_ranges(
    duration: f64,
    peak: f64,
    bracket: f64,
) -> Option<(Option<TimeRange>, TimeRange, Option<TimeRange>)> {
    const MIN_SEGMENT: f64 = 0.25;

    let slow_start = (peak - bracket).max(0.0);
    let slow_end = (peak + bracket).min(duration);
    if slow_end - slow_start < MIN_SEGMENT {
        return None;
    }

    let pre = (slow_start >= MIN_SEGMENT).then(|| TimeRange::new(0.0, slow_start));
    let post = (duration - slow_end >= MIN_SEGMENT).then(|| TimeRange::new(slow_end, duration));
    Some((pre, TimeRange::new(slow_start, slow_end), post))
}

/// Expected final duration of a plan's clip after effects, for reel
/// offset math. Only the slow-motion splice changes a clip's length.
pub fn planned_clip_duration(
    plan: &ClipPlan,
    event: &FusedEvent,
    config: &EffectsConfig,
) -> f64 {
    let base = plan.source_range.duration_secs();
    if !plan.has_effect(Effect::SlowMotion) || config.slowmo_factor <= 0.0 {
        return base;
    }
    let peak = (event.timestamp_secs - plan.source_range.start_secs).clamp(0.0, base);
    match splice_ranges(base, peak, config.slowmo_bracket_secs) {
        Some((_, slow, _)) => base + slow.duration_secs() * (1.0 / config.slowmo_factor - 1.0),
        None => base,
    }
}

/// In-clip offset of the event's peak moment after effects. The
/// slow-motion splice stretches the bracket ahead of the peak, pushing
/// the on-screen moment later in the final clip; overlays and captions
/// are placed against this offset, not the pre-splice one.
pub fn planned_peak_offset(plan: &ClipPlan, event: &FusedEvent, config: &EffectsConfig) -> f64 {
    let base = plan.source_range.duration_secs();
    let peak = (event.timestamp_secs - plan.source_range.start_secs).clamp(0.0, base);
    if !plan.has_effect(Effect::SlowMotion) || config.slowmo_factor <= 0.0 {
        return peak;
    }
    match splice_ranges(base, peak, config.slowmo_bracket_secs) {
        Some((_, slow, _)) => {
            peak + (peak - slow.start_secs) * (1.0 / config.slowmo_factor - 1.0)
        }
        None => peak,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::event::{
        BoundingBox, CandidateEvent, EventKind, SignalSource,
    };

    fn event_with_boxes(boxes: &[(f64, BoundingBox)]) -> FusedEvent {
        FusedEvent {
            timestamp_secs: 100.0,
            kind: EventKind::goal(),
            score: 5.0,
            confidence: 1.0,
            signals: vec![SignalSource::ObjectDetector],
            candidates: boxes
                .iter()
                .map(|&(ts, b)| {
                    CandidateEvent::new(SignalSource::ObjectDetector, ts, 0.9).with_bbox(b)
                })
                .collect(),
        }
    }

    #[test]
    fn test_crop_track_clip_local_and_sorted() {
        let range = TimeRange::new(92.0, 110.0);
        let event = event_with_boxes(&[
            (105.0, BoundingBox::new(0.4, 0.4, 0.2, 0.2)),
            (95.0, BoundingBox::new(0.1, 0.1, 0.2, 0.2)),
        ]);
        let track = crop_track(&event, &range, 1.5);
        assert_eq!(track.len(), 2);
        assert_eq!(track[0].t, 3.0);
        assert_eq!(track[1].t, 13.0);
        assert!(track[0].t < track[1].t);
    }

    #[test]
    fn test_crop_window_stays_inside_frame() {
        // boxes hugging each frame corner
        let range = TimeRange::new(0.0, 10.0);
        let event = event_with_boxes(&[
            (1.0, BoundingBox::new(0.0, 0.0, 0.05, 0.05)),
            (5.0, BoundingBox::new(0.95, 0.95, 0.05, 0.05)),
        ]);
        let zoom = 1.5;
        let window = 1.0 / zoom;
        for k in crop_track(&event, &range, zoom) {
            assert!(k.x >= 0.0 && k.x + window <= 1.0 + 1e-9, "x origin {}", k.x);
            assert!(k.y >= 0.0 && k.y + window <= 1.0 + 1e-9, "y origin {}", k.y);
        }
    }

    #[test]
    fn test_boxes_outside_range_ignored() {
        let range = TimeRange::new(50.0, 60.0);
        let event = event_with_boxes(&[(10.0, BoundingBox::new(0.4, 0.4, 0.2, 0.2))]);
        assert!(crop_track(&event, &range, 1.5).is_empty());
    }

    #[test]
    fn test_splice_ranges_centered() {
        let (pre, slow, post) = splice_ranges(18.0, 8.0, 3.0).unwrap();
        assert_eq!(pre.unwrap(), TimeRange::new(0.0, 5.0));
        assert_eq!(slow, TimeRange::new(5.0, 11.0));
        assert_eq!(post.unwrap(), TimeRange::new(11.0, 18.0));
    }

    #[test]
    fn test_splice_ranges_peak_at_clip_start() {
        let (pre, slow, post) = splice_ranges(18.0, 0.0, 3.0).unwrap();
        assert!(pre.is_none());
        assert_eq!(slow, TimeRange::new(0.0, 3.0));
        assert_eq!(post.unwrap(), TimeRange::new(3.0, 18.0));
    }

    #[test]
    fn test_splice_ranges_too_short() {
        assert!(splice_ranges(0.1, 0.05, 3.0).is_none());
    }

    #[test]
    fn test_planned_clip_duration() {
        use reel_models::config::EffectsConfig;
        use reel_models::plan::{ClipPlan, Effect};

        let config = EffectsConfig::default();
        let event = event_with_boxes(&[]);
        let mut plan = ClipPlan {
            event_index: 0,
            source_range: TimeRange::new(92.0, 110.0),
            effects: vec![Effect::Stabilize],
            overlays: Vec::new(),
            short_targets: Vec::new(),
        };
        assert_eq!(planned_clip_duration(&plan, &event, &config), 18.0);

        // 6s slow window at 0.65x adds 6 * (1/0.65 - 1) seconds
        plan.effects.push(Effect::SlowMotion);
        let expected = 18.0 + 6.0 * (1.0 / 0.65 - 1.0);
        assert!((planned_clip_duration(&plan, &event, &config) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_planned_peak_offset_shifts_with_slow_motion() {
        use reel_models::config::EffectsConfig;
        use reel_models::plan::{ClipPlan, Effect};

        let config = EffectsConfig::default();
        let event = event_with_boxes(&[]); // timestamp 100.0
        let mut plan = ClipPlan {
            event_index: 0,
            source_range: TimeRange::new(92.0, 110.0),
            effects: vec![Effect::Stabilize],
            overlays: Vec::new(),
            short_targets: Vec::new(),
        };
        // no splice: the peak sits at its source offset
        assert_eq!(planned_peak_offset(&plan, &event, &config), 8.0);

        // 3s of pre-peak bracket stretch at 0.65x pushes the peak later
        plan.effects.push(Effect::SlowMotion);
        let expected = 8.0 + 3.0 * (1.0 / 0.65 - 1.0);
        assert!((planned_peak_offset(&plan, &event, &config) - expected).abs() < 1e-9);

        // the shifted peak never passes the planned clip end
        assert!(
            planned_peak_offset(&plan, &event, &config)
                <= planned_clip_duration(&plan, &event, &config)
        );
    }
}
