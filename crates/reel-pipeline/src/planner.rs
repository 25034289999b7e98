//! Clip planner: selected timeline in, deterministic edit plans out.
//!
//! The ranked selection drives short-form targeting (top-ranked events
//! get verticals); the reel itself plays in match order, so the planner
//! re-sorts chronologically and derives one plan per event from the
//! per-kind context-window and effect tables.

use reel_models::config::RenderConfig;
use reel_models::event::{EventKind, FusedEvent};
use reel_models::plan::{ClipPlan, OverlaySpec, ShortTarget};
use reel_models::MatchDescriptor;

use crate::effects::planned_peak_offset;

pub struct ClipPlanner {
    config: RenderConfig,
    descriptor: MatchDescriptor,
}

impl ClipPlanner {
    pub fn new(config: RenderConfig, descriptor: MatchDescriptor) -> Self {
        Self { config, descriptor }
    }

    /// Expand a ranked selection into the chronological timeline and its
    /// clip plans. `plans[i]` belongs to `timeline[i]`.
    pub fn plan(
        &self,
        ranked: &[FusedEvent],
        source_duration_secs: f64,
    ) -> (Vec<FusedEvent>, Vec<ClipPlan>) {
        // Short-form slots go to the top of the ranking before the
        // chronological re-sort.
        let shorts_cut = self.config.export.shorts_count.min(ranked.len());
        let mut indexed: Vec<(usize, FusedEvent)> =
            ranked.iter().cloned().enumerate().collect();
        indexed.sort_by(|(_, a), (_, b)| {
            a.timestamp_secs
                .partial_cmp(&b.timestamp_secs)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut score = ScoreState::default();
        let mut timeline = Vec::with_capacity(indexed.len());
        let mut plans = Vec::with_capacity(indexed.len());

        for (event_index, (rank_position, event)) in indexed.into_iter().enumerate() {
            score.apply(&self.descriptor, &event);

            let window = self.config.context_window(event.kind.name());
            let source_range = window
                .around(event.timestamp_secs)
                .clamp_to(source_duration_secs);

            let mut short_targets = Vec::new();
            if rank_position < shorts_cut {
                short_targets.push(ShortTarget {
                    width: self.config.export.short_width,
                    height: self.config.export.short_height,
                });
            }

            let mut plan = ClipPlan {
                event_index,
                source_range,
                effects: self.config.effects.effects_for(event.kind.name()),
                overlays: Vec::new(),
                short_targets,
            };

            if self.config.overlays.enable_scoreboard {
                plan.overlays.push(OverlaySpec::Scoreboard {
                    home_goals: score.home,
                    away_goals: score.away,
                });
            }
            if self.config.overlays.enable_lower_thirds && event.kind.has_lower_third() {
                // placed against the post-effects peak: a slow-motion
                // splice pushes the on-screen moment later in the clip
                plan.overlays.push(OverlaySpec::LowerThird {
                    text: event.kind.headline(),
                    at_secs: planned_peak_offset(&plan, &event, &self.config.effects),
                });
            }

            plans.push(plan);
            timeline.push(event);
        }

        (timeline, plans)
    }
}

/// Running score while walking the timeline chronologically.
///
/// An OCR score reading inside the event is authoritative; otherwise a
/// goal increments the side whose name or short code matches the
/// attributed team, defaulting to home when unattributed.
#[derive(Debug, Default, Clone, Copy)]
struct ScoreState {
    home: u32,
    away: u32,
}

impl ScoreState {
    fn apply(&mut self, descriptor: &MatchDescriptor, event: &FusedEvent) {
        if let Some(reading) = event
            .candidates
            .iter()
            .rev()
            .filter_map(|c| c.payload.score_reading.as_deref())
            .next()
        {
            if let Some((home, away)) = parse_reading(reading) {
                self.home = home;
                self.away = away;
                return;
            }
        }

        if let EventKind::Goal { team, .. } = &event.kind {
            if team
                .as_deref()
                .map(|t| matches_team(t, &descriptor.away.name, &descriptor.away.short_code))
                .unwrap_or(false)
            {
                self.away += 1;
            } else {
                self.home += 1;
            }
        }
    }
}

fn matches_team(label: &str, name: &str, short_code: &str) -> bool {
    label.eq_ignore_ascii_case(name) || label.eq_ignore_ascii_case(short_code)
}

fn parse_reading(reading: &str) -> Option<(u32, u32)> {
    let (home, away) = reading.split_once('-')?;
    Some((home.trim().parse().ok()?, away.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::event::{CandidateEvent, SignalSource};
    use reel_models::plan::Effect;
    use reel_models::{ScoreLine, TeamInfo};

    fn descriptor() -> MatchDescriptor {
        MatchDescriptor {
            home: TeamInfo::new("Riverton United", "RIV"),
            away: TeamInfo::new("Ashworth Town", "ASH"),
            competition: "County League".into(),
            date: "2026-03-14".into(),
            venue: None,
            final_score: ScoreLine { home: 2, away: 1 },
            man_of_the_match: None,
        }
    }

    fn goal_event(ts: f64, team: &str) -> FusedEvent {
        FusedEvent {
            timestamp_secs: ts,
            kind: EventKind::Goal {
                player: Some("P1".into()),
                team: Some(team.into()),
                minute: Some((ts / 60.0) as u32),
                assist: None,
            },
            score: 5.0,
            confidence: 1.0,
            signals: vec![SignalSource::GroundTruth],
            candidates: vec![
                CandidateEvent::new(SignalSource::GroundTruth, ts, 1.0)
                    .with_truth(EventKind::goal()),
            ],
        }
    }

    fn action_event(ts: f64, score: f64) -> FusedEvent {
        FusedEvent {
            timestamp_secs: ts,
            kind: EventKind::Action,
            score,
            confidence: 0.5,
            signals: vec![SignalSource::MotionBurst],
            candidates: vec![CandidateEvent::new(SignalSource::MotionBurst, ts, 0.5)],
        }
    }

    #[test]
    fn test_goal_gets_full_treatment() {
        let planner = ClipPlanner::new(RenderConfig::default(), descriptor());
        let (timeline, plans) = planner.plan(&[goal_event(1380.0, "RIV")], 5400.0);
        assert_eq!(timeline.len(), 1);
        let plan = &plans[0];
        assert!(plan.has_effect(Effect::Stabilize));
        assert!(plan.has_effect(Effect::DynamicFraming));
        assert!(plan.has_effect(Effect::SlowMotion));
        // goal window is -8/+10
        assert_eq!(plan.source_range.start_secs, 1372.0);
        assert_eq!(plan.source_range.end_secs, 1390.0);
    }

    #[test]
    fn test_plain_action_is_stabilize_only() {
        let planner = ClipPlanner::new(RenderConfig::default(), descriptor());
        let (_, plans) = planner.plan(&[action_event(100.0, 1.0)], 5400.0);
        assert_eq!(plans[0].effects, vec![Effect::Stabilize]);
    }

    #[test]
    fn test_window_clamped_to_recording() {
        let planner = ClipPlanner::new(RenderConfig::default(), descriptor());
        let (_, plans) = planner.plan(&[goal_event(4.0, "RIV")], 5400.0);
        assert_eq!(plans[0].source_range.start_secs, 0.0);
    }

    fn lower_third_offset(plan: &ClipPlan) -> f64 {
        plan.overlays
            .iter()
            .find_map(|o| match o {
                OverlaySpec::LowerThird { at_secs, .. } => Some(*at_secs),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_lower_third_tracks_spliced_peak() {
        let planner = ClipPlanner::new(RenderConfig::default(), descriptor());
        let (_, plans) = planner.plan(&[goal_event(1380.0, "RIV")], 5400.0);
        // source offset 8.0, pushed back by the pre-peak bracket stretch
        let expected = 8.0 + 3.0 * (1.0 / 0.65 - 1.0);
        assert!((lower_third_offset(&plans[0]) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_effect_override_flows_into_plans() {
        let mut config = RenderConfig::default();
        config
            .effects
            .kind_effects
            .insert("goal".to_string(), vec![Effect::Stabilize]);
        let planner = ClipPlanner::new(config, descriptor());
        let (_, plans) = planner.plan(&[goal_event(1380.0, "RIV")], 5400.0);
        assert_eq!(plans[0].effects, vec![Effect::Stabilize]);
        // with no splice the lower third sits at the source offset
        assert_eq!(lower_third_offset(&plans[0]), 8.0);
    }

    #[test]
    fn test_running_score_tracks_both_sides() {
        let planner = ClipPlanner::new(RenderConfig::default(), descriptor());
        let (_, plans) = planner.plan(
            &[
                goal_event(600.0, "RIV"),
                goal_event(1800.0, "ASH"),
                goal_event(3000.0, "Riverton United"),
            ],
            5400.0,
        );
        let scores: Vec<(u32, u32)> = plans
            .iter()
            .filter_map(|p| {
                p.overlays.iter().find_map(|o| match o {
                    OverlaySpec::Scoreboard {
                        home_goals,
                        away_goals,
                    } => Some((*home_goals, *away_goals)),
                    _ => None,
                })
            })
            .collect();
        assert_eq!(scores, vec![(1, 0), (1, 1), (2, 1)]);
    }

    #[test]
    fn test_ocr_reading_overrides_increment() {
        let planner = ClipPlanner::new(RenderConfig::default(), descriptor());
        let mut event = goal_event(600.0, "RIV");
        event.candidates.push(
            CandidateEvent::new(SignalSource::Ocr, 601.0, 0.9).with_score_reading("0-1"),
        );
        let (_, plans) = planner.plan(&[event], 5400.0);
        match &plans[0].overlays[0] {
            OverlaySpec::Scoreboard {
                home_goals,
                away_goals,
            } => {
                assert_eq!((*home_goals, *away_goals), (0, 1));
            }
            other => panic!("expected scoreboard, got {:?}", other),
        }
    }

    #[test]
    fn test_top_ranked_events_get_short_targets() {
        let mut config = RenderConfig::default();
        config.export.shorts_count = 2;
        let planner = ClipPlanner::new(config, descriptor());

        // ranked order: the goal, then two actions by score
        let ranked = vec![
            goal_event(3000.0, "RIV"),
            action_event(100.0, 4.0),
            action_event(2000.0, 2.0),
        ];
        let (timeline, plans) = planner.plan(&ranked, 5400.0);

        // chronological timeline
        assert_eq!(timeline[0].timestamp_secs, 100.0);
        assert_eq!(timeline[2].timestamp_secs, 3000.0);

        // shorts follow the ranking: the goal and the 4.0 action
        let with_shorts: Vec<f64> = timeline
            .iter()
            .zip(&plans)
            .filter(|(_, p)| !p.short_targets.is_empty())
            .map(|(e, _)| e.timestamp_secs)
            .collect();
        assert_eq!(with_shorts, vec![100.0, 3000.0]);
    }

    #[test]
    fn test_stoppage_has_no_lower_third() {
        let planner = ClipPlanner::new(RenderConfig::default(), descriptor());
        let event = FusedEvent {
            timestamp_secs: 50.0,
            kind: EventKind::Stoppage,
            score: 1.0,
            confidence: 0.9,
            signals: vec![SignalSource::Tonal],
            candidates: vec![CandidateEvent::new(SignalSource::Tonal, 50.0, 0.9)],
        };
        let (_, plans) = planner.plan(&[event], 5400.0);
        assert!(plans[0]
            .overlays
            .iter()
            .all(|o| matches!(o, OverlaySpec::Scoreboard { .. })));
    }
}
