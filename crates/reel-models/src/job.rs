//! Render jobs and the pipeline stage state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::event::FusedEvent;
use crate::plan::ClipPlan;

/// Unique identifier for a render job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline stage of a render job.
///
/// Stages advance strictly left to right; `Failed` is reachable from
/// any non-terminal stage and records the originating stage, the error
/// and the accumulated attempt count of the failing operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum RenderStage {
    Queued,
    Extracting,
    Fusing,
    Planning,
    Editing,
    Overlaying,
    Concatenating,
    Mastering,
    Exporting,
    Done,
    Failed {
        /// Stage the failure originated from. Serialized as
        /// `failed_stage` so it cannot collide with the variant tag.
        #[serde(rename = "failed_stage")]
        stage: String,
        reason: String,
        /// Attempts made by the failing operation
        attempts: u32,
    },
}

impl RenderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStage::Queued => "queued",
            RenderStage::Extracting => "extracting",
            RenderStage::Fusing => "fusing",
            RenderStage::Planning => "planning",
            RenderStage::Editing => "editing",
            RenderStage::Overlaying => "overlaying",
            RenderStage::Concatenating => "concatenating",
            RenderStage::Mastering => "mastering",
            RenderStage::Exporting => "exporting",
            RenderStage::Done => "done",
            RenderStage::Failed { .. } => "failed",
        }
    }

    /// Position in the forward sequence, if this is a forward stage.
    fn sequence_index(&self) -> Option<usize> {
        match self {
            RenderStage::Queued => Some(0),
            RenderStage::Extracting => Some(1),
            RenderStage::Fusing => Some(2),
            RenderStage::Planning => Some(3),
            RenderStage::Editing => Some(4),
            RenderStage::Overlaying => Some(5),
            RenderStage::Concatenating => Some(6),
            RenderStage::Mastering => Some(7),
            RenderStage::Exporting => Some(8),
            RenderStage::Done => Some(9),
            RenderStage::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderStage::Done | RenderStage::Failed { .. })
    }

    /// Whether moving to `next` is a legal transition.
    ///
    /// Legal moves are one step forward in the sequence, or to `Failed`
    /// from any non-terminal stage.
    pub fn can_transition_to(&self, next: &RenderStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            RenderStage::Failed { .. } => true,
            _ => match (self.sequence_index(), next.sequence_index()) {
                (Some(a), Some(b)) => b == a + 1,
                _ => false,
            },
        }
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One produced vertical short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShortArtifact {
    pub path: String,
    /// Index of the source event in the selected timeline
    pub event_index: usize,
    /// Headline of the source event
    pub event_headline: String,
    pub duration_secs: f64,
}

/// Output manifest for a completed job.
///
/// Consumers receive only artifact paths and metadata; a failed job
/// never produces a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobManifest {
    pub job_id: JobId,
    /// Long-form highlight reel, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reel_path: Option<String>,
    pub shorts: Vec<ShortArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitles_path: Option<String>,
    /// Directory holding the reproduction log
    pub reproduction_log_dir: String,
}

/// Top-level unit of work: one match recording in, one set of
/// artifacts out.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderJob {
    pub id: JobId,
    pub stage: RenderStage,
    /// Selected event timeline, populated after fusing
    pub timeline: Vec<FusedEvent>,
    /// Ordered clip plans, populated after planning
    pub plans: Vec<ClipPlan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Manifest, present only once the job is done
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<JobManifest>,
}

impl RenderJob {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            stage: RenderStage::Queued,
            timeline: Vec::new(),
            plans: Vec::new(),
            created_at: now,
            updated_at: now,
            manifest: None,
        }
    }

    /// Advance to the next stage, enforcing legal transitions.
    pub fn advance(&mut self, next: RenderStage) -> Result<(), IllegalTransition> {
        if !self.stage.can_transition_to(&next) {
            return Err(IllegalTransition {
                from: self.stage.as_str(),
                to: next.as_str(),
            });
        }
        self.stage = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the job failed, recording the originating stage.
    pub fn fail(&mut self, reason: impl Into<String>, attempts: u32) {
        let stage = self.stage.as_str().to_string();
        self.stage = RenderStage::Failed {
            stage,
            reason: reason.into(),
            attempts,
        };
        self.updated_at = Utc::now();
    }
}

impl Default for RenderJob {
    fn default() -> Self {
        Self::new()
    }
}

/// Attempted stage transition that the state machine forbids.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal job transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: &'static str,
    pub to: &'static str,
}
