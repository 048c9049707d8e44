//! Structured job logging.

use tracing::{error, info, warn};

use storycut_models::{JobId, JobKind};

/// Logger carrying job context so lifecycle events stay greppable.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    kind: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, kind: JobKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            kind: kind.as_str(),
        }
    }

    pub fn start(&self, message: &str) {
        info!(job_id = %self.job_id, kind = %self.kind, "job started: {}", message);
    }

    pub fn progress(&self, message: &str) {
        info!(job_id = %self.job_id, kind = %self.kind, "job progress: {}", message);
    }

    pub fn warning(&self, message: &str) {
        warn!(job_id = %self.job_id, kind = %self.kind, "job warning: {}", message);
    }

    pub fn failure(&self, message: &str) {
        error!(job_id = %self.job_id, kind = %self.kind, "job failed: {}", message);
    }

    pub fn completion(&self, message: &str) {
        info!(job_id = %self.job_id, kind = %self.kind, "job completed: {}", message);
    }
}
