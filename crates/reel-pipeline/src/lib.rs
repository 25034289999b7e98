//! Match-highlight render pipeline.
//!
//! This crate provides:
//! - Signal extractors over the source recording
//! - The fusion engine producing the ranked event timeline
//! - Clip planning, effects, overlays and audio mastering
//! - The render-job state machine and export fan-out
//! - A bounded job executor with graceful shutdown

pub mod assembly;
pub mod audio;
pub mod captions;
pub mod config;
pub mod effects;
pub mod error;
pub mod executor;
pub mod extract;
pub mod fusion;
pub mod logging;
pub mod overlay;
pub mod planner;
pub mod retry;
pub mod shorts;
pub mod submission;

#[cfg(test)]
pub mod test_support;

pub use assembly::AssemblyPipeline;
pub use config::WorkerConfig;
pub use error::{PipelineError, PipelineResult};
pub use executor::JobExecutor;
pub use fusion::FusionEngine;
pub use logging::JobLogger;
pub use planner::ClipPlanner;
pub use submission::JobSubmission;
