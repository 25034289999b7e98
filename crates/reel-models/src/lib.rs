//! Shared data models for the matchreel pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Match descriptors (teams, competition, final score)
//! - Candidate and fused highlight events
//! - Clip plans (context windows, effects, overlays)
//! - Render jobs and the pipeline stage state machine
//! - The immutable pipeline configuration

pub mod config;
pub mod descriptor;
pub mod event;
pub mod job;
pub mod plan;
pub mod timestamp;

// Re-export common types
pub use config::{
    AudioConfig, EffectsConfig, ExportConfig, OverlayConfig, RenderConfig, SelectionConfig,
    SignalConfig,
};
pub use descriptor::{MatchDescriptor, ScoreLine, TeamInfo};
pub use event::{BoundingBox, CandidateEvent, CardKind, EventKind, FusedEvent, SignalSource};
pub use job::{JobId, JobManifest, RenderJob, RenderStage, ShortArtifact};
pub use plan::{ClipPlan, ContextWindow, Effect, OverlaySpec, TimeRange};
pub use timestamp::{format_seconds, format_srt, parse_timestamp, TimestampError};
