//! Hooks run after a job has been persisted as ENQUEUED.

use std::sync::Arc;

use tracing::debug;

use conveyor_core::{Attempt, Job};

use crate::store::{AttemptStore, StoreError};

/// Prepares a freshly enqueued job before the dispatcher tries to run it.
pub trait PreparationHook: Send + Sync {
    fn prepare_for_processing(&self, job: &Job) -> Result<(), StoreError>;
}

/// Does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl PreparationHook for NoopHook {
    fn prepare_for_processing(&self, _job: &Job) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Records a pending attempt for jobs with no open attempt, so the job shows
/// a queued attempt while it waits for the worker slot.
pub struct PendingAttemptHook {
    attempts: Arc<dyn AttemptStore>,
}

impl PendingAttemptHook {
    pub fn new(attempts: Arc<dyn AttemptStore>) -> Self {
        Self { attempts }
    }
}

impl PreparationHook for PendingAttemptHook {
    fn prepare_for_processing(&self, job: &Job) -> Result<(), StoreError> {
        let latest = self.attempts.find_latest_for_job(job.id)?;
        if latest.as_ref().is_some_and(|a| !a.is_terminal()) {
            return Ok(());
        }

        let attempt = Attempt::next_for(job.id, latest.as_ref());
        debug!(job_id = %job.id, sequence = attempt.sequence, "recorded pending attempt");
        self.attempts.save(&attempt)
    }
}
