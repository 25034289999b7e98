//! Candidate and fused highlight events.
//!
//! Candidate events are the raw, per-extractor guesses; fused events are
//! the merged, classified, ranked timeline entries the rest of the
//! pipeline works from.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A normalized bounding box (coordinates relative to frame size, 0.0-1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Center X coordinate.
    pub fn cx(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Center Y coordinate.
    pub fn cy(&self) -> f64 {
        self.y + self.height / 2.0
    }

    /// Check the box lies within the unit square (with float epsilon).
    pub fn is_valid(&self) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.width > 0.0
            && self.height > 0.0
            && self.x + self.width <= 1.001
            && self.y + self.height <= 1.001
    }
}

/// Which detection pass produced a candidate event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Externally supplied, already-timestamped event log. Maximum trust.
    GroundTruth,
    /// Object detector locating the ball/player cluster
    ObjectDetector,
    /// Scoreboard OCR detecting score-digit changes
    Ocr,
    /// Short-term audio energy (crowd-reaction proxy)
    AudioEnergy,
    /// Whistle-band tonal detection
    Tonal,
    /// Dense motion burst inside a region of interest
    MotionBurst,
}

impl SignalSource {
    /// Default fusion weight for this source.
    ///
    /// Ground truth dominates, object/OCR are strong, the acoustic and
    /// motion proxies are weak corroborators.
    pub fn default_weight(&self) -> f64 {
        match self {
            SignalSource::GroundTruth => 5.0,
            SignalSource::Ocr => 3.0,
            SignalSource::ObjectDetector => 2.0,
            SignalSource::AudioEnergy => 1.5,
            SignalSource::Tonal => 1.0,
            SignalSource::MotionBurst => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::GroundTruth => "ground_truth",
            SignalSource::ObjectDetector => "object_detector",
            SignalSource::Ocr => "ocr",
            SignalSource::AudioEnergy => "audio_energy",
            SignalSource::Tonal => "tonal",
            SignalSource::MotionBurst => "motion_burst",
        }
    }
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Extractor-specific payload attached to a candidate event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct CandidatePayload {
    /// Bounding box from the object detector, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    /// Score reading from OCR ("2-1"), if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_reading: Option<String>,
    /// Ground-truth event attributes, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truth: Option<EventKind>,
}

/// A single extractor's timestamped, confidence-scored guess that
/// something notable happened. Never mutated after emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CandidateEvent {
    pub source: SignalSource,
    /// Position in the source recording, seconds
    pub timestamp_secs: f64,
    /// Confidence in 0.0-1.0
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "payload_is_empty")]
    pub payload: CandidatePayload,
}

fn payload_is_empty(p: &CandidatePayload) -> bool {
    p.bbox.is_none() && p.score_reading.is_none() && p.truth.is_none()
}

impl CandidateEvent {
    pub fn new(source: SignalSource, timestamp_secs: f64, confidence: f64) -> Self {
        Self {
            source,
            timestamp_secs,
            confidence: confidence.clamp(0.0, 1.0),
            payload: CandidatePayload::default(),
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.payload.bbox = Some(bbox);
        self
    }

    pub fn with_score_reading(mut self, reading: impl Into<String>) -> Self {
        self.payload.score_reading = Some(reading.into());
        self
    }

    pub fn with_truth(mut self, kind: EventKind) -> Self {
        self.payload.truth = Some(kind);
        self
    }
}

/// Card color for disciplinary events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    Yellow,
    Red,
}

impl CardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardKind::Yellow => "yellow",
            CardKind::Red => "red",
        }
    }
}

/// Classified event type, each variant carrying only its relevant
/// attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Goal {
        #[serde(skip_serializing_if = "Option::is_none")]
        player: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        team: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        minute: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        assist: Option<String>,
    },
    Card {
        #[serde(skip_serializing_if = "Option::is_none")]
        player: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        team: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        minute: Option<u32>,
        card: CardKind,
    },
    Chance {
        #[serde(skip_serializing_if = "Option::is_none")]
        player: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        minute: Option<u32>,
    },
    Stoppage,
    Action,
}

impl EventKind {
    pub fn goal() -> Self {
        EventKind::Goal {
            player: None,
            team: None,
            minute: None,
            assist: None,
        }
    }

    pub fn chance() -> Self {
        EventKind::Chance {
            player: None,
            minute: None,
        }
    }

    /// Stable lowercase name of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Goal { .. } => "goal",
            EventKind::Card { .. } => "card",
            EventKind::Chance { .. } => "chance",
            EventKind::Stoppage => "stoppage",
            EventKind::Action => "action",
        }
    }

    pub fn is_goal(&self) -> bool {
        matches!(self, EventKind::Goal { .. })
    }

    /// Whether this kind gets an event lower-third.
    pub fn has_lower_third(&self) -> bool {
        matches!(
            self,
            EventKind::Goal { .. } | EventKind::Card { .. } | EventKind::Chance { .. }
        )
    }

    /// One-line broadcast caption for lower-thirds and subtitles,
    /// e.g. `⚽ GOAL — P1 (RIV) 23’`.
    pub fn headline(&self) -> String {
        fn suffix(player: &Option<String>, team: &Option<String>, minute: &Option<u32>) -> String {
            let mut out = String::new();
            if let Some(p) = player {
                out.push_str(&format!(" — {}", p));
            }
            if let Some(t) = team {
                out.push_str(&format!(" ({})", t));
            }
            if let Some(m) = minute {
                out.push_str(&format!(" {}’", m));
            }
            out
        }

        match self {
            EventKind::Goal { player, team, minute, assist } => {
                let mut line = format!("⚽ GOAL{}", suffix(player, team, minute));
                if let Some(a) = assist {
                    line.push_str(&format!(" (assist: {})", a));
                }
                line
            }
            EventKind::Card { player, team, minute, card } => {
                let icon = match card {
                    CardKind::Yellow => "🟨",
                    CardKind::Red => "🟥",
                };
                format!("{} {} CARD{}", icon, card.as_str().to_uppercase(), suffix(player, team, minute))
            }
            EventKind::Chance { player, minute } => {
                format!("🔥 BIG CHANCE{}", suffix(player, &None, minute))
            }
            EventKind::Stoppage => "⏸ PLAY STOPPED".to_string(),
            EventKind::Action => "▶ HIGHLIGHT".to_string(),
        }
    }
}

/// A merged, classified, scored timeline entry.
///
/// Aggregates one or more candidate events from a merge window. Every
/// candidate event belongs to at most one fused event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FusedEvent {
    /// Mean timestamp of the contributing candidates, seconds
    pub timestamp_secs: f64,
    pub kind: EventKind,
    /// Weighted sum of contributing `weight x confidence`
    pub score: f64,
    /// Mean confidence of contributing candidates
    pub confidence: f64,
    /// Distinct sources that contributed
    pub signals: Vec<SignalSource>,
    /// The contributing candidates, in timestamp order
    pub candidates: Vec<CandidateEvent>,
}

impl FusedEvent {
    /// Whether any contributing candidate came from the ground-truth log.
    pub fn has_ground_truth(&self) -> bool {
        self.signals.contains(&SignalSource::GroundTruth)
    }

    /// The nearest-in-time bounding box from contributing object
    /// detections, if any, within `tolerance_secs` of `at_secs`.
    pub fn nearest_bbox(&self, at_secs: f64, tolerance_secs: f64) -> Option<BoundingBox> {
        self.candidates
            .iter()
            .filter_map(|c| c.payload.bbox.map(|b| (c.timestamp_secs, b)))
            .filter(|(t, _)| (t - at_secs).abs() <= tolerance_secs)
            .min_by(|(a, _), (b, _)| {
                (a - at_secs)
                    .abs()
                    .partial_cmp(&(b - at_secs).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(_, b)| b)
    }
}
