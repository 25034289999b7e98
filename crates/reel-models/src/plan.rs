//! Clip plans: the deterministic edit recipe for one selected event.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Half-open time range in the source recording, seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeRange {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl TimeRange {
    pub fn new(start_secs: f64, end_secs: f64) -> Self {
        Self { start_secs, end_secs }
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_secs && t < self.end_secs
    }

    /// Clamp the range to `[0, limit]`.
    pub fn clamp_to(&self, limit_secs: f64) -> Self {
        let start = self.start_secs.clamp(0.0, limit_secs);
        let end = self.end_secs.clamp(start, limit_secs);
        Self::new(start, end)
    }
}

/// Context window expanded around a fused event to form a clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContextWindow {
    /// Seconds included before the event timestamp
    pub before_secs: f64,
    /// Seconds included after the event timestamp
    pub after_secs: f64,
}

impl ContextWindow {
    pub fn new(before_secs: f64, after_secs: f64) -> Self {
        Self { before_secs, after_secs }
    }

    /// Expand an event timestamp into a source range.
    pub fn around(&self, timestamp_secs: f64) -> TimeRange {
        TimeRange::new(
            timestamp_secs - self.before_secs,
            timestamp_secs + self.after_secs,
        )
    }
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self::new(5.0, 5.0)
    }
}

/// A per-clip video effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Two-pass stabilization
    Stabilize,
    /// Action-centered dynamic framing ("smart zoom")
    DynamicFraming,
    /// Slow-motion replay splice around the peak moment
    SlowMotion,
}

/// A timed graphic layer applied to a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "overlay", rename_all = "snake_case")]
pub enum OverlaySpec {
    /// Persistent scoreboard for the clip's running score state
    Scoreboard { home_goals: u32, away_goals: u32 },
    /// Event lower-third shown at the event's in-clip offset
    LowerThird { text: String, at_secs: f64 },
}

/// Vertical short-form retarget of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ShortTarget {
    pub width: u32,
    pub height: u32,
}

/// The edit plan for one selected fused event.
///
/// Derived deterministically from the event kind via the context-window
/// table; consumed read-only by the effects, overlay and export stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipPlan {
    /// Index into the selected event timeline
    pub event_index: usize,
    /// Source recording range to extract
    pub source_range: TimeRange,
    /// Effects to apply, in order
    pub effects: Vec<Effect>,
    /// Graphic layers to composite
    pub overlays: Vec<OverlaySpec>,
    /// Vertical retargets requested for this clip
    pub short_targets: Vec<ShortTarget>,
}

impl ClipPlan {
    pub fn has_effect(&self, effect: Effect) -> bool {
        self.effects.contains(&effect)
    }
}
