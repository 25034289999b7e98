//! Worker configuration.

use std::time::Duration;

/// Process-level worker configuration.
///
/// Domain knobs (signal thresholds, selection policy, export targets)
/// live in `reel_models::RenderConfig` and arrive with each submission;
/// this covers the resources of the worker process itself.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum render jobs in flight
    pub max_concurrent_jobs: usize,
    /// Maximum parallel per-clip effect tasks within one job
    pub max_clip_parallel: usize,
    /// Whole-pipeline timeout per job
    pub job_timeout: Duration,
    /// Timeout per external media invocation
    pub op_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Work directory root; each job gets an isolated namespace below it
    pub work_dir: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            max_clip_parallel: 4,
            job_timeout: Duration::from_secs(7200), // 2 hours
            op_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(30),
            work_dir: "/tmp/matchreel".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("REEL_MAX_JOBS", defaults.max_concurrent_jobs),
            max_clip_parallel: env_parse("REEL_MAX_CLIP_PARALLEL", defaults.max_clip_parallel),
            job_timeout: Duration::from_secs(env_parse(
                "REEL_JOB_TIMEOUT_SECS",
                defaults.job_timeout.as_secs(),
            )),
            op_timeout: Duration::from_secs(env_parse(
                "REEL_OP_TIMEOUT_SECS",
                defaults.op_timeout.as_secs(),
            )),
            shutdown_timeout: Duration::from_secs(env_parse(
                "REEL_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout.as_secs(),
            )),
            work_dir: std::env::var("REEL_WORK_DIR")
                .unwrap_or_else(|_| defaults.work_dir.clone()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.max_concurrent_jobs, 5);
        assert_eq!(cfg.job_timeout, Duration::from_secs(7200));
    }
}
