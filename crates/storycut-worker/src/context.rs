//! Shared processing context.

use std::path::PathBuf;
use std::sync::Arc;

use storycut_blob::BlobStore;
use storycut_ml_client::{DescribeFrames, GeneratePlan, Transcribe};
use storycut_models::{Job, JobId, JobInput, MediaId};
use storycut_queue::{Queue, QueueMessage};
use storycut_registry::Registry;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Everything a job handler needs: configuration plus the shared
/// collaborators, all behind trait objects so tests swap in memory
/// backends and mock models.
#[derive(Clone)]
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub registry: Arc<dyn Registry>,
    pub blob: Arc<dyn BlobStore>,
    pub queue: Arc<dyn Queue>,
    pub transcriber: Arc<dyn Transcribe>,
    pub describer: Arc<dyn DescribeFrames>,
    pub plan_model: Arc<dyn GeneratePlan>,
}

impl ProcessingContext {
    /// Create a job record and enqueue its delivery ticket.
    pub async fn submit_job(&self, media_id: MediaId, input: JobInput) -> WorkerResult<Job> {
        let job = Job::new(media_id, input);
        self.registry.create_job(job.clone()).await?;
        self.queue.enqueue(QueueMessage::from(&job)).await?;
        Ok(job)
    }

    /// Scratch directory for one job, deleted when the job terminates.
    pub fn job_work_dir(&self, job_id: &JobId) -> PathBuf {
        PathBuf::from(&self.config.work_dir).join(job_id.as_str())
    }

    /// Whether cooperative cancellation was requested for a job. Handlers
    /// call this at safe points (between segments, between frame batches).
    pub async fn cancel_requested(&self, job_id: &JobId) -> WorkerResult<bool> {
        Ok(self
            .registry
            .get_job(job_id)
            .await?
            .map(|j| j.cancel_requested)
            .unwrap_or(false))
    }

    /// Bail out with `WorkerError::Cancelled` when the flag is set.
    pub async fn check_cancel(&self, job_id: &JobId) -> WorkerResult<()> {
        if self.cancel_requested(job_id).await? {
            return Err(WorkerError::Cancelled);
        }
        Ok(())
    }
}
