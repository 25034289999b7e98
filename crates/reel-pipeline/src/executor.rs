//! Bounded in-process job executor.
//!
//! Accepts submissions up front and runs at most
//! `max_concurrent_jobs` pipelines at a time; excess jobs wait in the
//! queued stage for a permit. Every job reaches a terminal state: a
//! panic, timeout or shutdown still leaves a queryable failed record.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use reel_media::{FfmpegOps, MediaOps, ReproductionLog};
use reel_models::job::{JobId, RenderJob, RenderStage};

use crate::assembly::AssemblyPipeline;
use crate::config::WorkerConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::submission::JobSubmission;

/// Builds the media backend for one job, given the job's reproduction
/// log and the executor's shutdown signal.
pub type OpsFactory =
    Arc<dyn Fn(Arc<ReproductionLog>, watch::Receiver<bool>) -> Arc<dyn MediaOps> + Send + Sync>;

#[derive(Default)]
struct ExecutorState {
    /// Live stage of each job still owned by a worker task
    stages: HashMap<JobId, watch::Receiver<RenderStage>>,
    handles: HashMap<JobId, JoinHandle<RenderJob>>,
    /// Terminal job records
    completed: HashMap<JobId, RenderJob>,
}

pub struct JobExecutor {
    config: WorkerConfig,
    permits: Arc<Semaphore>,
    ops_factory: OpsFactory,
    shutdown_tx: watch::Sender<bool>,
    state: Mutex<ExecutorState>,
}

impl JobExecutor {
    /// Executor backed by ffmpeg, with per-operation timeouts from the
    /// worker config.
    pub fn new(config: WorkerConfig) -> Self {
        let op_timeout = config.op_timeout.as_secs();
        Self::with_ops_factory(
            config,
            Arc::new(move |log, cancel_rx| {
                Arc::new(
                    FfmpegOps::new(log)
                        .with_timeout(op_timeout)
                        .with_cancel(cancel_rx),
                ) as Arc<dyn MediaOps>
            }),
        )
    }

    /// Executor over an arbitrary media backend.
    pub fn with_ops_factory(config: WorkerConfig, ops_factory: OpsFactory) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            config,
            ops_factory,
            shutdown_tx,
            state: Mutex::new(ExecutorState::default()),
        }
    }

    /// Accept a job and schedule it. Returns immediately; the job runs
    /// once a worker permit is free.
    pub fn submit(&self, submission: JobSubmission) -> PipelineResult<JobId> {
        if *self.shutdown_tx.borrow() {
            return Err(PipelineError::Cancelled(
                "executor is shutting down".into(),
            ));
        }
        submission.validate()?;

        let id = JobId::new();
        let job_dir = PathBuf::from(&self.config.work_dir).join(id.as_str());
        std::fs::create_dir_all(&job_dir)?;
        let log = Arc::new(ReproductionLog::create(job_dir.join("replay"))?);

        let shutdown_rx = self.shutdown_tx.subscribe();
        let ops = (self.ops_factory)(log.clone(), shutdown_rx.clone());
        let (stage_tx, stage_rx) = watch::channel(RenderStage::Queued);
        let pipeline = AssemblyPipeline::new(ops, log, submission, job_dir)
            .with_job_id(id.clone())
            .with_clip_parallelism(self.config.max_clip_parallel)
            .with_cancel(shutdown_rx)
            .with_stage_channel(stage_tx);

        let permits = self.permits.clone();
        let job_timeout = self.config.job_timeout;
        let job_id = id.clone();
        let handle = tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // pool closed before the job got a slot
                    let mut job = RenderJob::new();
                    job.id = job_id;
                    job.fail("executor shut down before the job started", 0);
                    return job;
                }
            };
            match tokio::time::timeout(job_timeout, pipeline.run()).await {
                Ok(job) => job,
                Err(_) => {
                    warn!(job_id = %job_id, timeout_secs = job_timeout.as_secs(), "job timed out");
                    let mut job = RenderJob::new();
                    job.id = job_id;
                    job.fail(
                        PipelineError::JobTimeout(job_timeout.as_secs()).to_string(),
                        1,
                    );
                    job
                }
            }
        });

        let mut state = self.state.lock().expect("executor state poisoned");
        state.stages.insert(id.clone(), stage_rx);
        state.handles.insert(id.clone(), handle);
        info!(job_id = %id, "job accepted");
        Ok(id)
    }

    /// Current stage of a job, or `None` for an unknown ID.
    pub fn status(&self, id: &JobId) -> Option<RenderStage> {
        let state = self.state.lock().expect("executor state poisoned");
        if let Some(job) = state.completed.get(id) {
            return Some(job.stage.clone());
        }
        state.stages.get(id).map(|rx| rx.borrow().clone())
    }

    /// Wait for a job to reach a terminal state and return its record.
    pub async fn wait(&self, id: &JobId) -> Option<RenderJob> {
        let handle = {
            let mut state = self.state.lock().expect("executor state poisoned");
            if let Some(job) = state.completed.get(id) {
                return Some(job.clone());
            }
            state.handles.remove(id)?
        };

        let job = match handle.await {
            Ok(job) => job,
            Err(e) => {
                // a panicked worker still yields a terminal record
                let mut job = RenderJob::new();
                job.id = id.clone();
                job.fail(format!("worker task failed: {}", e), 0);
                job
            }
        };

        let mut state = self.state.lock().expect("executor state poisoned");
        state.stages.remove(id);
        state.completed.insert(id.clone(), job.clone());
        Some(job)
    }

    /// Signal shutdown and wait for in-flight jobs, up to the
    /// configured shutdown timeout each. Queued jobs that never got a
    /// permit are failed.
    pub async fn shutdown(&self) {
        // send_replace stores the flag even with no live receivers, so
        // an idle executor still rejects later submissions
        self.shutdown_tx.send_replace(true);
        self.permits.close();

        let ids: Vec<JobId> = {
            let state = self.state.lock().expect("executor state poisoned");
            state.handles.keys().cloned().collect()
        };
        for id in ids {
            let handle = {
                let mut state = self.state.lock().expect("executor state poisoned");
                state.handles.remove(&id)
            };
            let Some(handle) = handle else { continue };
            let job = match tokio::time::timeout(self.config.shutdown_timeout, handle).await {
                Ok(Ok(job)) => job,
                Ok(Err(e)) => {
                    let mut job = RenderJob::new();
                    job.id = id.clone();
                    job.fail(format!("worker task failed: {}", e), 0);
                    job
                }
                Err(_) => {
                    warn!(job_id = %id, "job did not stop within the shutdown timeout");
                    let mut job = RenderJob::new();
                    job.id = id.clone();
                    job.fail("job abandoned at shutdown", 0);
                    job
                }
            };
            let mut state = self.state.lock().expect("executor state poisoned");
            state.stages.remove(&id);
            state.completed.insert(id, job);
        }
        info!("executor drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::GroundTruthEntry;
    use crate::test_support::FakeMediaOps;
    use reel_models::config::RenderConfig;
    use reel_models::event::EventKind;
    use reel_models::{MatchDescriptor, ScoreLine, TeamInfo};
    use std::time::Duration;

    fn fake_factory() -> OpsFactory {
        Arc::new(|_log, _cancel| Arc::new(FakeMediaOps::new()) as Arc<dyn MediaOps>)
    }

    fn submission() -> JobSubmission {
        let mut config = RenderConfig::default();
        config.signals.enable_audio_energy = false;
        config.signals.enable_tonal = false;
        config.signals.enable_motion_burst = false;
        config.signals.enable_object_detector = false;
        config.signals.enable_ocr = false;
        JobSubmission {
            descriptor: MatchDescriptor {
                home: TeamInfo::new("Riverton United", "RIV"),
                away: TeamInfo::new("Ashworth Town", "ASH"),
                competition: "County League".into(),
                date: "2026-03-14".into(),
                venue: None,
                final_score: ScoreLine::new(1, 0),
                man_of_the_match: None,
            },
            source: PathBuf::from("/tmp/match.mp4"),
            ground_truth: vec![GroundTruthEntry {
                timestamp: "23:00".into(),
                kind: EventKind::Goal {
                    player: Some("P1".into()),
                    team: Some("RIV".into()),
                    minute: Some(23),
                    assist: None,
                },
            }],
            config,
        }
    }

    fn executor(work: &tempfile::TempDir, max_jobs: usize) -> JobExecutor {
        let config = WorkerConfig {
            max_concurrent_jobs: max_jobs,
            work_dir: work.path().display().to_string(),
            ..WorkerConfig::default()
        };
        JobExecutor::with_ops_factory(config, fake_factory())
    }

    #[tokio::test]
    async fn test_submitted_job_runs_to_done() {
        let work = tempfile::tempdir().unwrap();
        let executor = executor(&work, 2);

        let id = executor.submit(submission()).unwrap();
        let job = executor.wait(&id).await.unwrap();
        assert_eq!(job.stage, RenderStage::Done);
        assert_eq!(executor.status(&id), Some(RenderStage::Done));
        assert!(job.manifest.is_some());
    }

    #[tokio::test]
    async fn test_queue_drains_past_pool_size() {
        let work = tempfile::tempdir().unwrap();
        let executor = executor(&work, 1);

        let ids: Vec<JobId> = (0..3)
            .map(|_| executor.submit(submission()).unwrap())
            .collect();
        for id in &ids {
            let job = executor.wait(id).await.unwrap();
            assert_eq!(job.stage, RenderStage::Done, "job {}", id);
        }
    }

    #[tokio::test]
    async fn test_unknown_job_has_no_status() {
        let work = tempfile::tempdir().unwrap();
        let executor = executor(&work, 1);
        assert_eq!(executor.status(&JobId::from_string("missing")), None);
        assert!(executor.wait(&JobId::from_string("missing")).await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_submission_rejected_up_front() {
        let work = tempfile::tempdir().unwrap();
        let executor = executor(&work, 1);
        let mut bad = submission();
        bad.ground_truth[0].timestamp = "not-a-time".into();
        assert!(matches!(
            executor.submit(bad),
            Err(PipelineError::InvalidSubmission(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_leaves_failed_record() {
        let work = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            max_concurrent_jobs: 1,
            job_timeout: Duration::from_millis(50),
            work_dir: work.path().display().to_string(),
            ..WorkerConfig::default()
        };
        // the fake stalls far past the job timeout on its first probe
        let stalled: OpsFactory = Arc::new(|_log, _cancel| {
            let ops = FakeMediaOps::new();
            ops.set_probe_delay(Duration::from_secs(300));
            Arc::new(ops) as Arc<dyn MediaOps>
        });
        let executor = JobExecutor::with_ops_factory(config, stalled);

        let id = executor.submit(submission()).unwrap();
        let job = executor.wait(&id).await.unwrap();
        match &job.stage {
            RenderStage::Failed { reason, .. } => {
                assert!(reason.contains("timed out"), "reason: {}", reason)
            }
            other => panic!("expected failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_submissions() {
        let work = tempfile::tempdir().unwrap();
        let executor = executor(&work, 1);
        executor.shutdown().await;
        assert!(matches!(
            executor.submit(submission()),
            Err(PipelineError::Cancelled(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_drains_accepted_jobs() {
        let work = tempfile::tempdir().unwrap();
        let executor = executor(&work, 2);
        let id = executor.submit(submission()).unwrap();
        executor.shutdown().await;
        // terminal either way: done if it finished, failed if cancelled
        let stage = executor.status(&id).unwrap();
        assert!(stage.is_terminal(), "stage: {:?}", stage);
    }
}
