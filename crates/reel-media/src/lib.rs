#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for the matchreel pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with timeout and cancellation
//! - FFprobe-based source inspection
//! - Filter-string construction for framing, slow motion, overlays and
//!   ducking
//! - The `MediaOps` media-operation seam every stage calls through
//! - Two-pass loudness measurement and correction
//! - The append-only reproduction log of executed operations

pub mod command;
pub mod error;
pub mod filters;
pub mod loudness;
pub mod ops;
pub mod probe;
pub mod replay;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use loudness::{loudnorm_apply_filter, loudnorm_measure_filter, LoudnessStats};
pub use ops::{FfmpegOps, MediaOps, OverlayAssetSpec, StabilizeParams};
pub use probe::{probe_video, VideoInfo};
pub use replay::ReproductionLog;
