//! Job executor: worker pool, claim loop and retry supervisor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use storycut_blob::keys;
use storycut_models::{ErrorCode, Job, JobError, JobInput, JobKind, JobStatus};
use storycut_queue::QueueMessage;
use storycut_registry::JobPatch;

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::handlers;
use crate::logging::JobLogger;
use crate::preconditions::preconditions_met;
use crate::retry::backoff_delay;

/// Executor that drives the durable queue against the registry.
pub struct JobExecutor {
    ctx: ProcessingContext,
    permits: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(ctx: ProcessingContext) -> Self {
        let permits = Arc::new(Semaphore::new(ctx.config.worker_pool_size));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());
        Self {
            ctx,
            permits,
            shutdown,
            consumer_name,
        }
    }

    /// Run until shutdown: consume tickets, execute jobs on the pool, and
    /// keep the queue healthy (promote delayed tickets, reclaim abandoned
    /// deliveries).
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            pool = self.ctx.config.worker_pool_size,
            "starting job executor"
        );
        self.ctx.queue.init().await?;

        let maintenance = self.spawn_maintenance();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_batch() => {
                    if let Err(e) = result {
                        error!("error consuming tickets: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        maintenance.abort();

        info!("waiting for in-flight jobs");
        let _ = tokio::time::timeout(self.ctx.config.shutdown_timeout, self.wait_for_jobs()).await;
        info!("job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    fn spawn_maintenance(&self) -> tokio::task::JoinHandle<()> {
        let ctx = self.ctx.clone();
        let consumer = self.consumer_name.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ctx.config.claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = ctx.queue.promote_scheduled().await {
                            warn!("failed to promote scheduled tickets: {}", e);
                        }
                        match ctx.queue.claim_stale(&consumer, ctx.config.claim_min_idle, 5).await {
                            Ok(claimed) => {
                                for (tag, message) in claimed {
                                    Self::execute_delivery(ctx.clone(), tag, message).await;
                                }
                            }
                            Err(e) => warn!("failed to claim stale deliveries: {}", e),
                        }
                        if let Err(e) = Self::sweep_stuck_running(&ctx).await {
                            warn!("stale-running sweep failed: {}", e);
                        }
                    }
                }
            }
        })
    }

    async fn consume_batch(&self) -> WorkerResult<()> {
        let available = self.permits.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .ctx
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        for (tag, message) in deliveries {
            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("worker pool closed"))?;
            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_delivery(ctx, tag, message).await;
            });
        }
        Ok(())
    }

    async fn wait_for_jobs(&self) {
        loop {
            if self.permits.available_permits() == self.ctx.config.worker_pool_size {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Process every currently-available ticket inline. Used by tests and
    /// single-shot maintenance; `run` uses the spawning path instead.
    pub async fn poll_once(&self) -> WorkerResult<usize> {
        self.ctx.queue.promote_scheduled().await?;
        let deliveries = self.ctx.queue.consume(&self.consumer_name, 0, 16).await?;
        let count = deliveries.len();
        for (tag, message) in deliveries {
            Self::execute_delivery(self.ctx.clone(), tag, message).await;
        }
        Ok(count)
    }

    /// Drive one delivery to completion: claim, dispatch under deadline,
    /// finalise the record, let the supervisor decide on a successor.
    async fn execute_delivery(ctx: ProcessingContext, tag: String, message: QueueMessage) {
        let ack = |reason: &'static str| {
            let ctx = ctx.clone();
            let tag = tag.clone();
            let message = message.clone();
            async move {
                debug!(job_id = %message.job_id, reason = reason, "acking ticket");
                if let Err(e) = ctx.queue.ack(&tag, &message).await {
                    warn!(job_id = %message.job_id, "failed to ack ticket: {}", e);
                }
            }
        };

        let job = match ctx.registry.get_job(&message.job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id = %message.job_id, "ticket for unknown job");
                ack("unknown job").await;
                return;
            }
            Err(e) => {
                error!(job_id = %message.job_id, "registry read failed: {}", e);
                ack("registry unavailable").await;
                return;
            }
        };

        // Duplicate delivery of a claimed or finished job is a benign race
        if job.status != JobStatus::Queued {
            ack("not queued").await;
            return;
        }

        // Cancellation before a worker ever claimed the job
        if job.cancel_requested {
            let _ = ctx
                .registry
                .update_job_if_status(
                    &job.job_id,
                    JobStatus::Queued,
                    JobStatus::Cancelled,
                    JobPatch::default(),
                )
                .await;
            counter!("storycut_jobs_cancelled_total").increment(1);
            ack("cancelled while queued").await;
            return;
        }

        // Unmet preconditions are a short requeue, not a failure
        match preconditions_met(&ctx, &job).await {
            Ok(true) => {}
            Ok(false) => {
                ack("preconditions pending").await;
                if let Err(e) = ctx
                    .queue
                    .enqueue_delayed(message.clone(), ctx.config.precondition_retry_delay)
                    .await
                {
                    error!(job_id = %message.job_id, "failed to requeue: {}", e);
                }
                return;
            }
            Err(e) => {
                error!(job_id = %message.job_id, "precondition check failed: {}", e);
                ack("precondition check failed").await;
                return;
            }
        }

        // Exactly one worker wins the claim
        let job = match ctx
            .registry
            .update_job_if_status(
                &job.job_id,
                JobStatus::Queued,
                JobStatus::Running,
                JobPatch::default(),
            )
            .await
        {
            Ok(job) => job,
            Err(e) if e.is_conflict() => {
                ack("lost claim race").await;
                return;
            }
            Err(e) => {
                error!(job_id = %message.job_id, "claim failed: {}", e);
                ack("claim failed").await;
                return;
            }
        };

        let logger = JobLogger::new(&job.job_id, job.kind);
        logger.start(&format!("attempt {}", job.attempt));
        counter!("storycut_jobs_started_total").increment(1);

        let deadline = Self::deadline_for_job(&ctx, &job).await;
        let outcome = tokio::time::timeout(deadline, handlers::dispatch(&ctx, &job)).await;

        match outcome {
            Ok(Ok(result)) => {
                let patch = match result {
                    Some(value) => JobPatch::result(value),
                    None => JobPatch::default(),
                };
                if let Err(e) = ctx
                    .registry
                    .update_job_if_status(&job.job_id, JobStatus::Running, JobStatus::Completed, patch)
                    .await
                {
                    error!(job_id = %job.job_id, "completion write failed: {}", e);
                }
                counter!("storycut_jobs_completed_total").increment(1);
                logger.completion("done");
            }
            Ok(Err(e)) if e.is_cancelled() => {
                let _ = ctx
                    .registry
                    .update_job_if_status(
                        &job.job_id,
                        JobStatus::Running,
                        JobStatus::Cancelled,
                        JobPatch::default(),
                    )
                    .await;
                counter!("storycut_jobs_cancelled_total").increment(1);
                logger.progress("cancelled at a safe point");
            }
            Ok(Err(e)) => {
                Self::finalise_failure(&ctx, &job, e.to_job_error(), &tag, &message).await;
            }
            Err(_elapsed) => {
                // The handler future was dropped, killing its children;
                // record the breach and let the supervisor decide
                let error = JobError::new(
                    ErrorCode::DeadlineExceeded,
                    format!("deadline of {:?} exceeded", deadline),
                );
                Self::finalise_failure(&ctx, &job, error, &tag, &message).await;
            }
        }

        Self::cleanup_scratch(&ctx, &job).await;
        ack("processed").await;
    }

    /// Mark the job failed and, when policy allows, enqueue a successor
    /// with incremented attempt and backed-off visibility. The failed
    /// record itself is never touched again.
    async fn finalise_failure(
        ctx: &ProcessingContext,
        job: &Job,
        error: JobError,
        tag: &str,
        message: &QueueMessage,
    ) {
        let logger = JobLogger::new(&job.job_id, job.kind);
        logger.failure(&error.to_string());
        counter!("storycut_jobs_failed_total").increment(1);

        let code = error.code;
        if let Err(e) = ctx
            .registry
            .update_job_if_status(
                &job.job_id,
                JobStatus::Running,
                JobStatus::Failed,
                JobPatch::error(error),
            )
            .await
        {
            error!(job_id = %job.job_id, "failure write failed: {}", e);
        }

        // Story planning retries once even on contract errors; model-side
        // failures are usually deterministic, so one more try is enough.
        let retryable =
            code.is_retryable() || (job.kind == JobKind::PlanStory && code == ErrorCode::InvalidPlan);
        let max_attempts = ctx.config.max_attempts(job.kind);

        if retryable && job.attempt < max_attempts {
            let successor = job.successor();
            let delay = backoff_delay(
                job.attempt,
                ctx.config.retry_backoff_base_s,
                ctx.config.retry_jitter_s,
            );
            logger.progress(&format!(
                "scheduling attempt {}/{} in {:?}",
                successor.attempt, max_attempts, delay
            ));
            counter!("storycut_jobs_retried_total").increment(1);

            if let Err(e) = ctx.registry.create_job(successor.clone()).await {
                error!(job_id = %job.job_id, "failed to create successor: {}", e);
                return;
            }
            if let Err(e) = ctx
                .queue
                .enqueue_delayed(QueueMessage::from(&successor), delay)
                .await
            {
                error!(job_id = %successor.job_id, "failed to enqueue successor: {}", e);
            }
        } else if retryable {
            // Exhausted: park the ticket for operators
            if let Err(e) = ctx
                .queue
                .dead_letter(tag, message, &format!("{:?} after {} attempts", code, job.attempt))
                .await
            {
                warn!(job_id = %job.job_id, "failed to dead-letter: {}", e);
            }
        }
    }

    /// Delete the job's scratch: the blob `tmp/` prefix and the local work
    /// directory. Runs on every terminal outcome.
    async fn cleanup_scratch(ctx: &ProcessingContext, job: &Job) {
        if let Err(e) = ctx.blob.delete_prefix(&keys::tmp_prefix(&job.job_id)).await {
            warn!(job_id = %job.job_id, "blob scratch cleanup failed: {}", e);
        }
        let work_dir = ctx.job_work_dir(&job.job_id);
        if work_dir.exists() {
            tokio::fs::remove_dir_all(&work_dir).await.ok();
        }
    }

    async fn deadline_for_job(ctx: &ProcessingContext, job: &Job) -> Duration {
        let source_duration = ctx
            .registry
            .get_media(&job.media_id)
            .await
            .ok()
            .flatten()
            .and_then(|m| m.duration())
            .unwrap_or(0.0);

        let keep_duration = match &job.input {
            JobInput::ApplyPlan { plan_id, .. } => ctx
                .registry
                .get_plan(plan_id)
                .await
                .ok()
                .flatten()
                .map(|p| p.total_keep())
                .unwrap_or(0.0),
            _ => 0.0,
        };

        ctx.config
            .deadline_for(job.kind, source_duration, keep_duration)
    }

    /// Fail `Running` jobs whose worker died without finalising them. The
    /// generous threshold (twice the per-kind deadline) means only truly
    /// orphaned records are swept; the supervisor then applies the normal
    /// retry policy via a fresh ticket.
    async fn sweep_stuck_running(ctx: &ProcessingContext) -> WorkerResult<()> {
        let running = ctx.registry.list_jobs_by_status(JobStatus::Running).await?;
        let now = Utc::now();

        for job in running {
            let Some(started_at) = job.started_at else {
                continue;
            };
            let deadline = Self::deadline_for_job(ctx, &job).await;
            let threshold = deadline * 2;
            let age = (now - started_at)
                .to_std()
                .unwrap_or_default();
            if age <= threshold {
                continue;
            }

            warn!(job_id = %job.job_id, age_secs = age.as_secs(), "sweeping stuck running job");
            let error = JobError::new(
                ErrorCode::DeadlineExceeded,
                format!("worker went silent after {:?}", age),
            );
            if ctx
                .registry
                .update_job_if_status(
                    &job.job_id,
                    JobStatus::Running,
                    JobStatus::Failed,
                    JobPatch::error(error),
                )
                .await
                .is_ok()
                && job.attempt < ctx.config.max_attempts(job.kind)
            {
                let successor = job.successor();
                let delay = backoff_delay(
                    job.attempt,
                    ctx.config.retry_backoff_base_s,
                    ctx.config.retry_jitter_s,
                );
                if ctx.registry.create_job(successor.clone()).await.is_ok() {
                    ctx.queue
                        .enqueue_delayed(QueueMessage::from(&successor), delay)
                        .await
                        .ok();
                }
            }
        }
        Ok(())
    }
}
