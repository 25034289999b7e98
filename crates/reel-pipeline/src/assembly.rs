//! Assembly pipeline: the render-job state machine.
//!
//! Drives one job through extracting, fusing, planning, editing,
//! overlaying, concatenating, mastering and exporting. Every stage is a
//! barrier over the previous stage's complete output; only extraction
//! and per-clip editing run work concurrently. Failures retain partial
//! artifacts and leave the job in `failed` with the originating stage.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

use reel_media::{MediaOps, ReproductionLog};
use reel_models::job::{JobId, JobManifest, RenderJob, RenderStage, ShortArtifact};
use reel_models::plan::ClipPlan;
use reel_models::event::FusedEvent;

use crate::captions::{build_captions, write_srt};
use crate::effects::{planned_clip_duration, EffectsEngine};
use crate::error::{PipelineError, PipelineResult};
use crate::extract::{enabled_extractors, run_all, ExtractionContext};
use crate::fusion::FusionEngine;
use crate::logging::JobLogger;
use crate::overlay::{duck_ranges, AssetCache, OverlayCompositor};
use crate::planner::ClipPlanner;
use crate::retry::{retry_async, RetryConfig, RetryResult};
use crate::shorts::ShortsRenderer;
use crate::submission::JobSubmission;
use crate::audio::AudioEngine;

pub struct AssemblyPipeline {
    job_id: JobId,
    ops: Arc<dyn MediaOps>,
    log: Arc<ReproductionLog>,
    submission: JobSubmission,
    work_dir: PathBuf,
    max_clip_parallel: usize,
    cancel_rx: Option<watch::Receiver<bool>>,
    stage_tx: Option<watch::Sender<RenderStage>>,
}

impl AssemblyPipeline {
    pub fn new(
        ops: Arc<dyn MediaOps>,
        log: Arc<ReproductionLog>,
        submission: JobSubmission,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            ops,
            log,
            submission,
            work_dir,
            max_clip_parallel: 4,
            cancel_rx: None,
            stage_tx: None,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Run under an externally assigned job ID.
    pub fn with_job_id(mut self, id: JobId) -> Self {
        self.job_id = id;
        self
    }

    pub fn with_clip_parallelism(mut self, n: usize) -> Self {
        self.max_clip_parallel = n.max(1);
        self
    }

    /// Cancellation signal checked at every stage boundary.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Publish every stage transition for status queries.
    pub fn with_stage_channel(mut self, stage_tx: watch::Sender<RenderStage>) -> Self {
        self.stage_tx = Some(stage_tx);
        self
    }

    fn advance(&self, job: &mut RenderJob, next: RenderStage) -> PipelineResult<()> {
        job.advance(next)?;
        self.publish(job);
        Ok(())
    }

    fn publish(&self, job: &RenderJob) {
        if let Some(tx) = &self.stage_tx {
            let _ = tx.send(job.stage.clone());
        }
    }

    /// Run the job to a terminal state. Never panics a worker slot: any
    /// error lands the job in `failed` with its originating stage, and
    /// the reproduction log is finalized either way.
    pub async fn run(&self) -> RenderJob {
        let mut job = RenderJob::new();
        job.id = self.job_id.clone();
        let logger = JobLogger::new(&job.id, "queued");
        logger.start(&format!(
            "job accepted for {}",
            self.submission.descriptor.fixture_label()
        ));

        match self.run_stages(&mut job, &logger).await {
            Ok(manifest) => {
                job.manifest = Some(manifest);
                match job.advance(RenderStage::Done) {
                    Ok(()) => logger.for_stage("done").start("job complete"),
                    Err(e) => job.fail(e.to_string(), 0),
                }
            }
            Err(e) => {
                let attempts = e.attempts();
                logger
                    .for_stage(job.stage.as_str())
                    .failure(&format!("job failed: {}", e));
                // partial artifacts under work_dir are retained for diagnosis
                job.fail(e.to_string(), attempts);
            }
        }
        self.publish(&job);

        if let Err(e) = self.log.finalize() {
            logger.warning(&format!("reproduction log not finalized: {}", e));
        }
        job
    }

    async fn run_stages(
        &self,
        job: &mut RenderJob,
        logger: &JobLogger,
    ) -> PipelineResult<JobManifest> {
        let config = &self.submission.config;
        let descriptor = &self.submission.descriptor;
        let ops = self.ops.as_ref();

        // extracting: all signal passes run concurrently over the
        // read-only source
        self.advance(job, RenderStage::Extracting)?;
        self.check_cancelled()?;
        let stage_log = logger.for_stage("extracting");
        let info = ops.probe(&self.submission.source).await?;
        let extract_dir = self.work_dir.join("extract");
        tokio::fs::create_dir_all(&extract_dir).await?;

        let ground_truth = self.submission.ground_truth_candidates()?;
        let extractors = enabled_extractors(&config.signals, ground_truth);
        let ctx = ExtractionContext {
            source: &self.submission.source,
            info: &info,
            ops,
            config: &config.signals,
            work_dir: &extract_dir,
        };
        let candidates = run_all(&extractors, &ctx, &stage_log).await;
        stage_log.progress(&format!("{} candidates from {} extractors", candidates.len(), extractors.len()));

        // fusing
        self.advance(job, RenderStage::Fusing)?;
        self.check_cancelled()?;
        let engine = FusionEngine::new(
            config.signals.clone(),
            config.fusion.clone(),
            config.selection.clone(),
        );
        let ranked = engine.run(candidates);
        if ranked.is_empty() {
            return Err(PipelineError::EmptyTimeline(
                "no candidate events survived selection".into(),
            ));
        }
        logger
            .for_stage("fusing")
            .progress(&format!("{} events selected", ranked.len()));

        // planning
        self.advance(job, RenderStage::Planning)?;
        self.check_cancelled()?;
        let planner = ClipPlanner::new(config.clone(), descriptor.clone());
        let (timeline, plans) = planner.plan(&ranked, info.duration);
        job.timeline = timeline.clone();
        job.plans = plans.clone();

        // editing: per-clip effects, bounded parallelism, input order
        // preserved
        self.advance(job, RenderStage::Editing)?;
        self.check_cancelled()?;
        let clips_dir = self.work_dir.join("clips");
        tokio::fs::create_dir_all(&clips_dir).await?;
        let clips = self
            .edit_clips(&plans, &timeline, &clips_dir, logger)
            .await?;

        // overlaying
        self.advance(job, RenderStage::Overlaying)?;
        self.check_cancelled()?;
        let overlay_dir = self.work_dir.join("overlays");
        tokio::fs::create_dir_all(&overlay_dir).await?;
        let compositor = OverlayCompositor::new(ops, &config.overlays, descriptor);
        let mut cache = AssetCache::default();
        let mut overlaid = Vec::with_capacity(clips.len());
        for (clip, plan) in clips.iter().zip(&plans) {
            overlaid.push(
                compositor
                    .composite(clip, plan, &mut cache, &overlay_dir)
                    .await?,
            );
        }
        let slates = compositor
            .slates(info.width, info.height, &overlay_dir)
            .await?;

        // concatenating: fatal on exhausted retries
        self.advance(job, RenderStage::Concatenating)?;
        self.check_cancelled()?;
        let mut segments: Vec<PathBuf> = Vec::new();
        if let Some((opening, _)) = &slates {
            segments.push(opening.clone());
        }
        segments.extend(overlaid.iter().cloned());
        if let Some((_, closing)) = &slates {
            segments.push(closing.clone());
        }
        let reel_raw = self.work_dir.join("reel_raw.mp4");
        let retry = RetryConfig::new("concat");
        match retry_async(&retry, || ops.concat(&segments, &reel_raw)).await {
            RetryResult::Success(()) => {}
            RetryResult::Failed { error, attempts } => {
                return Err(PipelineError::stage_failed(
                    "concatenating",
                    error.to_string(),
                    attempts,
                ))
            }
        }

        // mastering
        self.advance(job, RenderStage::Mastering)?;
        self.check_cancelled()?;
        let durations: Vec<f64> = plans
            .iter()
            .zip(&timeline)
            .map(|(p, e)| planned_clip_duration(p, e, &config.effects))
            .collect();
        let slate_secs = slates.as_ref().map(|_| config.overlays.slate_secs);
        let overlay_ranges = duck_ranges(
            &plans,
            &durations,
            slate_secs,
            slate_secs,
            config.overlays.hold_secs,
        );
        let audio = AudioEngine::new(ops, &config.audio, logger.for_stage("mastering"));
        let mastered = audio
            .master(&reel_raw, &overlay_ranges, &self.work_dir)
            .await?;

        // exporting: reel, shorts, subtitle track
        self.advance(job, RenderStage::Exporting)?;
        self.check_cancelled()?;
        let manifest = self
            .export(job, &timeline, &plans, &clips, &mastered, &durations, slate_secs)
            .await?;
        Ok(manifest)
    }

    async fn edit_clips(
        &self,
        plans: &[ClipPlan],
        timeline: &[FusedEvent],
        clips_dir: &Path,
        logger: &JobLogger,
    ) -> PipelineResult<Vec<PathBuf>> {
        let config = &self.submission.config;
        let ops = self.ops.as_ref();
        let source = &self.submission.source;
        let stage_log = logger.for_stage("editing");

        // owned items: the per-clip futures run on spawned worker tasks
        let items: Vec<(ClipPlan, FusedEvent)> = plans
            .iter()
            .cloned()
            .zip(timeline.iter().cloned())
            .collect();
        stream::iter(items.into_iter().enumerate())
            .map(|(i, (plan, event))| {
                let stage_log = stage_log.clone();
                async move {
                    let base = clips_dir.join(format!("clip_{:03}.mp4", i));
                    let retry = RetryConfig::new("extract_segment");
                    match retry_async(&retry, || {
                        ops.extract_segment(source, plan.source_range, &base)
                    })
                    .await
                    {
                        RetryResult::Success(()) => {}
                        RetryResult::Failed { error, attempts } => {
                            return Err(PipelineError::stage_failed(
                                "editing",
                                error.to_string(),
                                attempts,
                            ))
                        }
                    }

                    let engine = EffectsEngine::new(ops, &config.effects, stage_log);
                    engine.apply(&base, &plan, &event, clips_dir).await
                }
            })
            .buffered(self.max_clip_parallel)
            .try_collect()
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn export(
        &self,
        job: &RenderJob,
        timeline: &[FusedEvent],
        plans: &[ClipPlan],
        clips: &[PathBuf],
        mastered: &Path,
        durations: &[f64],
        slate_secs: Option<f64>,
    ) -> PipelineResult<JobManifest> {
        let config = &self.submission.config;
        let out_dir = self.work_dir.join("out");
        tokio::fs::create_dir_all(&out_dir).await?;

        let reel_path = if config.export.reel {
            let path = out_dir.join("reel.mp4");
            tokio::fs::copy(mastered, &path).await?;
            Some(path.display().to_string())
        } else {
            None
        };

        let shorts_dir = out_dir.join("shorts");
        tokio::fs::create_dir_all(&shorts_dir).await?;
        let renderer = ShortsRenderer::new(self.ops.as_ref(), config, &self.submission.descriptor);
        let mut shorts: Vec<ShortArtifact> = Vec::new();
        for (i, (plan, event)) in plans.iter().zip(timeline).enumerate() {
            for &target in &plan.short_targets {
                let artifact = renderer
                    .render(&clips[i], plan, event, target, &shorts_dir, shorts.len())
                    .await?;
                shorts.push(artifact);
            }
        }

        let subtitles_path = if config.export.subtitles {
            let captions = build_captions(
                timeline,
                plans,
                durations,
                slate_secs,
                config.overlays.hold_secs,
                &config.effects,
            );
            let path = out_dir.join("reel.srt");
            write_srt(&path, &captions).await?;
            Some(path.display().to_string())
        } else {
            None
        };

        Ok(JobManifest {
            job_id: job.id.clone(),
            reel_path,
            shorts,
            subtitles_path,
            reproduction_log_dir: self.log.dir().display().to_string(),
        })
    }

    fn check_cancelled(&self) -> PipelineResult<()> {
        if let Some(rx) = &self.cancel_rx {
            if *rx.borrow() {
                return Err(PipelineError::Cancelled(
                    "cancellation requested".into(),
                ));
            }
        }
        Ok(())
    }
}
