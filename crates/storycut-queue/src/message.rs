//! Queue delivery tickets.

use serde::{Deserialize, Serialize};

use storycut_models::{Job, JobId, JobKind, MediaId};

/// One delivery ticket. The job's authoritative state (input, status,
/// attempt) lives in the registry; the ticket only says "job X wants a
/// worker". Media id and kind ride along for logging and metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub job_id: JobId,
    pub media_id: MediaId,
    pub kind: JobKind,
}

impl QueueMessage {
    pub fn new(job_id: JobId, media_id: MediaId, kind: JobKind) -> Self {
        Self {
            job_id,
            media_id,
            kind,
        }
    }

    /// Key used to drop duplicate enqueues of the same job.
    pub fn idempotency_key(&self) -> &str {
        self.job_id.as_str()
    }
}

impl From<&Job> for QueueMessage {
    fn from(job: &Job) -> Self {
        Self::new(job.job_id.clone(), job.media_id.clone(), job.kind)
    }
}
