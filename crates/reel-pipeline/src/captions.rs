//! SRT subtitle track derived from the selected event timeline.
//!
//! One caption block per selected event, positioned at the event's
//! in-reel offset and held for the lower-third duration.

use std::path::Path;

use reel_models::config::EffectsConfig;
use reel_models::event::FusedEvent;
use reel_models::plan::ClipPlan;
use reel_models::timestamp::format_srt;

use crate::effects::planned_peak_offset;
use crate::error::PipelineResult;

/// One subtitle block.
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub index: usize,
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

/// Build caption blocks in reel time.
///
/// `clip_durations[i]` is the final duration of `plans[i]`'s clip;
/// the opening slate shifts every caption when present.
pub fn build_captions(
    timeline: &[FusedEvent],
    plans: &[ClipPlan],
    clip_durations: &[f64],
    opening_slate_secs: Option<f64>,
    hold_secs: f64,
    effects: &EffectsConfig,
) -> Vec<Caption> {
    let mut captions = Vec::new();
    let mut offset = opening_slate_secs.unwrap_or(0.0);

    for ((event, plan), &duration) in timeline.iter().zip(plans).zip(clip_durations) {
        let in_clip = planned_peak_offset(plan, event, effects).clamp(0.0, duration);
        let start = offset + in_clip;
        let end = (start + hold_secs).min(offset + duration);
        if end > start {
            captions.push(Caption {
                index: captions.len() + 1,
                start_secs: start,
                end_secs: end,
                text: event.kind.headline(),
            });
        }
        offset += duration;
    }
    captions
}

/// Serialize caption blocks to SRT.
pub fn render_srt(captions: &[Caption]) -> String {
    let mut out = String::new();
    for caption in captions {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            caption.index,
            format_srt(caption.start_secs),
            format_srt(caption.end_secs),
            caption.text,
        ));
    }
    out
}

pub async fn write_srt(path: &Path, captions: &[Caption]) -> PipelineResult<()> {
    tokio::fs::write(path, render_srt(captions)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::event::{CandidateEvent, EventKind, SignalSource};
    use reel_models::plan::{Effect, TimeRange};

    fn goal(ts: f64) -> FusedEvent {
        FusedEvent {
            timestamp_secs: ts,
            kind: EventKind::Goal {
                player: Some("P1".into()),
                team: Some("RIV".into()),
                minute: Some(23),
                assist: None,
            },
            score: 5.0,
            confidence: 1.0,
            signals: vec![SignalSource::GroundTruth],
            candidates: vec![CandidateEvent::new(SignalSource::GroundTruth, ts, 1.0)],
        }
    }

    fn plan(range: TimeRange) -> ClipPlan {
        ClipPlan {
            event_index: 0,
            source_range: range,
            effects: Vec::new(),
            overlays: Vec::new(),
            short_targets: Vec::new(),
        }
    }

    #[test]
    fn test_caption_timing_in_reel_time() {
        let timeline = vec![goal(1380.0), goal(2000.0)];
        let plans = vec![
            plan(TimeRange::new(1372.0, 1390.0)),
            plan(TimeRange::new(1992.0, 2010.0)),
        ];
        let captions = build_captions(
            &timeline,
            &plans,
            &[18.0, 18.0],
            Some(4.0),
            3.0,
            &EffectsConfig::default(),
        );

        assert_eq!(captions.len(), 2);
        // slate 4.0 + event offset 8.0 inside the first clip
        assert_eq!(captions[0].start_secs, 12.0);
        assert_eq!(captions[0].end_secs, 15.0);
        // second clip starts at 4 + 18
        assert_eq!(captions[1].start_secs, 30.0);
        assert_eq!(captions[1].index, 2);
    }

    #[test]
    fn test_caption_text_from_event() {
        let captions = build_captions(
            &[goal(100.0)],
            &[plan(TimeRange::new(92.0, 110.0))],
            &[18.0],
            None,
            3.0,
            &EffectsConfig::default(),
        );
        assert_eq!(captions[0].text, "⚽ GOAL — P1 (RIV) 23’");
    }

    #[test]
    fn test_caption_follows_spliced_peak() {
        let mut p = plan(TimeRange::new(1372.0, 1390.0));
        p.effects.push(Effect::SlowMotion);
        let duration = 18.0 + 6.0 * (1.0 / 0.65 - 1.0);
        let captions = build_captions(
            &[goal(1380.0)],
            &[p],
            &[duration],
            None,
            3.0,
            &EffectsConfig::default(),
        );
        // the slow bracket ahead of the peak delays the caption
        let expected = 8.0 + 3.0 * (1.0 / 0.65 - 1.0);
        assert!((captions[0].start_secs - expected).abs() < 1e-9);
    }

    #[test]
    fn test_srt_rendering() {
        let captions = vec![Caption {
            index: 1,
            start_secs: 12.0,
            end_secs: 15.0,
            text: "⚽ GOAL — P1 (RIV) 23’".to_string(),
        }];
        let srt = render_srt(&captions);
        assert!(srt.starts_with("1\n00:00:12,000 --> 00:00:15,000\n"));
        assert!(srt.contains("⚽ GOAL — P1 (RIV) 23’\n\n"));
    }

    #[test]
    fn test_caption_clamped_to_clip_end() {
        let captions = build_captions(
            &[goal(108.0)],
            &[plan(TimeRange::new(92.0, 110.0))],
            &[18.0],
            None,
            3.0,
            &EffectsConfig::default(),
        );
        // event sits 16s in; caption ends at clip end, not 19s
        assert_eq!(captions[0].end_secs, 18.0);
    }
}
