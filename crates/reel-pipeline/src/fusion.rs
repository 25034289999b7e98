//! Fusion engine: candidate events in, ranked event timeline out.
//!
//! Candidates are bucketed into fixed one-second buckets, adjacent
//! non-empty buckets within the merge gap collapse into one fused
//! event, and the fused events are classified and ranked. Every
//! candidate contributes to exactly one fused event.

use std::collections::BTreeMap;

use reel_models::config::{FusionConfig, SelectionConfig, SignalConfig};
use reel_models::event::{CandidateEvent, EventKind, FusedEvent, SignalSource};

pub struct FusionEngine {
    signals: SignalConfig,
    fusion: FusionConfig,
    selection: SelectionConfig,
}

impl FusionEngine {
    pub fn new(signals: SignalConfig, fusion: FusionConfig, selection: SelectionConfig) -> Self {
        Self {
            signals,
            fusion,
            selection,
        }
    }

    /// Full pass: merge, classify, rank, select.
    pub fn run(&self, candidates: Vec<CandidateEvent>) -> Vec<FusedEvent> {
        let fused = self.fuse(candidates);
        let ranked = rank(fused);
        self.select(ranked)
    }

    /// Merge candidates into classified fused events, in timestamp order.
    pub fn fuse(&self, mut candidates: Vec<CandidateEvent>) -> Vec<FusedEvent> {
        candidates.retain(|c| c.timestamp_secs.is_finite() && c.timestamp_secs >= 0.0);
        if candidates.is_empty() {
            return Vec::new();
        }
        let bucket = self.fusion.bucket_secs.max(1e-6);

        // Bucket by quantized timestamp; BTreeMap keeps buckets ordered.
        let mut buckets: BTreeMap<i64, Vec<CandidateEvent>> = BTreeMap::new();
        for c in candidates {
            let key = (c.timestamp_secs / bucket).floor() as i64;
            buckets.entry(key).or_default().push(c);
        }

        // Merge runs of non-empty buckets whose center gap stays within
        // the merge window.
        let mut groups: Vec<MergeGroup> = Vec::new();
        for (key, members) in buckets {
            let center = (key as f64 + 0.5) * bucket;
            match groups.last_mut() {
                Some(group) if center - group.last_center <= self.fusion.merge_gap_secs => {
                    group.absorb(center, members);
                }
                _ => groups.push(MergeGroup::new(center, members)),
            }
        }

        groups
            .into_iter()
            .map(|g| self.finish_group(g))
            .collect()
    }

    fn finish_group(&self, group: MergeGroup) -> FusedEvent {
        let mut candidates = group.members;
        candidates.sort_by(|a, b| {
            a.timestamp_secs
                .partial_cmp(&b.timestamp_secs)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let score: f64 = candidates
            .iter()
            .map(|c| self.signals.weight(c.source) * c.confidence)
            .sum();
        let confidence =
            candidates.iter().map(|c| c.confidence).sum::<f64>() / candidates.len() as f64;

        let mut signals: Vec<SignalSource> = Vec::new();
        for c in &candidates {
            if !signals.contains(&c.source) {
                signals.push(c.source);
            }
        }

        let kind = self.classify(&candidates, score);

        FusedEvent {
            timestamp_secs: group.mean_center,
            kind,
            score,
            confidence,
            signals,
            candidates,
        }
    }

    /// Classification precedence: a ground-truth label wins outright
    /// (goals first among several), a whistle with no goal evidence
    /// reads as a stoppage, a high enough score reads as a chance,
    /// anything else is generic action.
    fn classify(&self, candidates: &[CandidateEvent], score: f64) -> EventKind {
        let truths: Vec<&EventKind> = candidates
            .iter()
            .filter(|c| c.source == SignalSource::GroundTruth)
            .filter_map(|c| c.payload.truth.as_ref())
            .collect();
        if let Some(goal) = truths.iter().find(|k| k.is_goal()) {
            return (*goal).clone();
        }
        if let Some(first) = truths.first() {
            return (*first).clone();
        }

        let has_tonal = candidates.iter().any(|c| c.source == SignalSource::Tonal);
        if has_tonal {
            return EventKind::Stoppage;
        }
        if score >= self.fusion.chance_threshold {
            return EventKind::chance();
        }
        EventKind::Action
    }

    /// Apply the configured cutoffs to an already-ranked timeline.
    /// Ground-truth-backed events are exempt from the score floor.
    pub fn select(&self, ranked: Vec<FusedEvent>) -> Vec<FusedEvent> {
        let mut selected: Vec<FusedEvent> = ranked
            .into_iter()
            .filter(|e| {
                e.has_ground_truth()
                    || self.selection.min_score.map_or(true, |min| e.score >= min)
            })
            .collect();
        if let Some(max) = self.selection.max_events {
            selected.truncate(max);
        }
        selected
    }
}

struct MergeGroup {
    members: Vec<CandidateEvent>,
    last_center: f64,
    mean_center: f64,
    bucket_count: usize,
}

impl MergeGroup {
    fn new(center: f64, members: Vec<CandidateEvent>) -> Self {
        Self {
            members,
            last_center: center,
            mean_center: center,
            bucket_count: 1,
        }
    }

    fn absorb(&mut self, center: f64, members: Vec<CandidateEvent>) {
        self.members.extend(members);
        self.last_center = center;
        self.bucket_count += 1;
        // running mean over merged bucket centers
        self.mean_center += (center - self.mean_center) / self.bucket_count as f64;
    }
}

/// Rank fused events for selection: ground-truth-backed first, then
/// goals, then by descending score; ties go to the earlier timestamp.
pub fn rank(mut events: Vec<FusedEvent>) -> Vec<FusedEvent> {
    events.sort_by(|a, b| {
        rank_class(a)
            .cmp(&rank_class(b))
            .then_with(|| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| {
                a.timestamp_secs
                    .partial_cmp(&b.timestamp_secs)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
    events
}

fn rank_class(event: &FusedEvent) -> u8 {
    if event.has_ground_truth() {
        0
    } else if event.kind.is_goal() {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::event::CardKind;

    fn engine() -> FusionEngine {
        FusionEngine::new(
            SignalConfig::default(),
            FusionConfig::default(),
            SelectionConfig::default(),
        )
    }

    fn candidate(source: SignalSource, ts: f64, conf: f64) -> CandidateEvent {
        CandidateEvent::new(source, ts, conf)
    }

    #[test]
    fn test_nearby_candidates_merge_into_one_event() {
        // two extractors fire 0.4s apart
        let fused = engine().fuse(vec![
            candidate(SignalSource::AudioEnergy, 10.2, 0.8),
            candidate(SignalSource::MotionBurst, 10.6, 0.6),
        ]);
        assert_eq!(fused.len(), 1);
        let e = &fused[0];
        assert_eq!(e.candidates.len(), 2);
        // 1.5 * 0.8 + 1.0 * 0.6
        assert!((e.score - 1.8).abs() < 1e-9);
        assert!((e.timestamp_secs - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_gap_beyond_window_splits_events() {
        let fused = engine().fuse(vec![
            candidate(SignalSource::AudioEnergy, 10.0, 0.8),
            candidate(SignalSource::AudioEnergy, 16.5, 0.8),
        ]);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_chained_buckets_keep_merging() {
        // 0s, 4s, 8s: each gap is within 5s so the chain is one event
        let fused = engine().fuse(vec![
            candidate(SignalSource::AudioEnergy, 0.5, 0.5),
            candidate(SignalSource::AudioEnergy, 4.5, 0.5),
            candidate(SignalSource::AudioEnergy, 8.5, 0.5),
        ]);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].candidates.len(), 3);
    }

    #[test]
    fn test_every_candidate_fused_exactly_once() {
        let candidates: Vec<CandidateEvent> = (0..50)
            .map(|i| candidate(SignalSource::MotionBurst, i as f64 * 3.7, 0.5))
            .collect();
        let fused = engine().fuse(candidates.clone());
        let total: usize = fused.iter().map(|e| e.candidates.len()).sum();
        assert_eq!(total, candidates.len());
    }

    #[test]
    fn test_ground_truth_goal_forces_goal() {
        let fused = engine().fuse(vec![
            candidate(SignalSource::GroundTruth, 1380.0, 1.0).with_truth(EventKind::Goal {
                player: Some("P1".into()),
                team: None,
                minute: Some(23),
                assist: None,
            }),
            candidate(SignalSource::Tonal, 1381.0, 0.9),
        ]);
        assert_eq!(fused.len(), 1);
        assert!(fused[0].kind.is_goal());
        match &fused[0].kind {
            EventKind::Goal { player, .. } => assert_eq!(player.as_deref(), Some("P1")),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_ground_truth_card_wins_over_whistle() {
        let fused = engine().fuse(vec![
            candidate(SignalSource::GroundTruth, 100.0, 1.0).with_truth(EventKind::Card {
                player: None,
                team: None,
                minute: Some(30),
                card: CardKind::Yellow,
            }),
            candidate(SignalSource::Tonal, 101.0, 0.8),
        ]);
        assert_eq!(fused[0].kind.name(), "card");
    }

    #[test]
    fn test_whistle_without_goal_is_stoppage() {
        let fused = engine().fuse(vec![candidate(SignalSource::Tonal, 50.0, 0.9)]);
        assert_eq!(fused[0].kind, EventKind::Stoppage);
    }

    #[test]
    fn test_high_score_is_chance_low_is_action() {
        // audio 0.9 + motion 0.9 + object 0.9 = 1.35 + 0.9 + 1.8 = 4.05
        let high = engine().fuse(vec![
            candidate(SignalSource::AudioEnergy, 20.0, 0.9),
            candidate(SignalSource::MotionBurst, 20.4, 0.9),
            candidate(SignalSource::ObjectDetector, 20.8, 0.9),
        ]);
        assert_eq!(high[0].kind.name(), "chance");

        let low = engine().fuse(vec![candidate(SignalSource::MotionBurst, 20.0, 0.5)]);
        assert_eq!(low[0].kind, EventKind::Action);
    }

    #[test]
    fn test_ranking_order() {
        let events = engine().fuse(vec![
            // purely inferred, very high score
            candidate(SignalSource::ObjectDetector, 500.0, 1.0),
            candidate(SignalSource::AudioEnergy, 500.5, 1.0),
            candidate(SignalSource::MotionBurst, 501.0, 1.0),
            // low-confidence ground truth far away (scores 5.0 * 0.3)
            candidate(SignalSource::GroundTruth, 100.0, 0.3).with_truth(EventKind::Stoppage),
        ]);
        let ranked = rank(events);
        assert!(ranked[0].has_ground_truth());
        assert!(!ranked[1].has_ground_truth());
        assert!(ranked[1].score > ranked[0].score);
    }

    #[test]
    fn test_ranking_tie_breaks_on_earlier_timestamp() {
        let e = engine();
        let a = e.fuse(vec![candidate(SignalSource::MotionBurst, 300.0, 0.5)]);
        let b = e.fuse(vec![candidate(SignalSource::MotionBurst, 100.0, 0.5)]);
        let ranked = rank(vec![a[0].clone(), b[0].clone()]);
        assert_eq!(ranked[0].timestamp_secs, b[0].timestamp_secs);
    }

    #[test]
    fn test_selection_cutoffs() {
        let mut selection = SelectionConfig::default();
        selection.min_score = Some(2.0);
        selection.max_events = Some(2);
        let e = FusionEngine::new(SignalConfig::default(), FusionConfig::default(), selection);

        let ranked = rank(e.fuse(vec![
            candidate(SignalSource::ObjectDetector, 10.0, 1.0), // 2.0
            candidate(SignalSource::ObjectDetector, 100.0, 1.0), // 2.0
            candidate(SignalSource::MotionBurst, 200.0, 0.5),   // 0.5, below floor
            // ground truth below the floor is still kept
            candidate(SignalSource::GroundTruth, 300.0, 0.3).with_truth(EventKind::Stoppage),
        ]));
        let selected = e.select(ranked);
        assert_eq!(selected.len(), 2);
        assert!(selected[0].has_ground_truth());
        assert!(selected.iter().all(|ev| ev.timestamp_secs < 150.0 || ev.has_ground_truth()));
    }

    #[test]
    fn test_fusion_is_idempotent() {
        let e = engine();
        let first = e.run(vec![
            candidate(SignalSource::AudioEnergy, 10.2, 0.8),
            candidate(SignalSource::MotionBurst, 10.6, 0.6),
            candidate(SignalSource::Tonal, 50.0, 0.9),
            candidate(SignalSource::GroundTruth, 1380.0, 1.0).with_truth(EventKind::goal()),
        ]);

        // re-serialize and re-fuse the surviving candidates
        let json = serde_json::to_string(&first).unwrap();
        let back: Vec<FusedEvent> = serde_json::from_str(&json).unwrap();
        let replay: Vec<CandidateEvent> =
            back.into_iter().flat_map(|ev| ev.candidates).collect();
        let second = e.run(replay);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.kind, b.kind);
            assert!((a.timestamp_secs - b.timestamp_secs).abs() < 1e-9);
            assert!((a.score - b.score).abs() < 1e-9);
        }
    }

    #[test]
    fn test_negative_and_nan_timestamps_dropped() {
        let fused = engine().fuse(vec![
            candidate(SignalSource::MotionBurst, -5.0, 0.5),
            candidate(SignalSource::MotionBurst, f64::NAN, 0.5),
        ]);
        assert!(fused.is_empty());
    }
}
