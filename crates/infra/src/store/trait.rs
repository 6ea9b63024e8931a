use std::sync::Arc;

use thiserror::Error;

use conveyor_core::{Attempt, Job, JobId, JobState};

/// Persistence error raised by job and attempt stores.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

/// Durable storage for jobs.
///
/// Implementations make no locking promises beyond single-call atomicity;
/// serialising the PROCESSING transition is the dispatcher's job.
pub trait JobStore: Send + Sync {
    /// Look up a job without its children.
    fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Every stored job, oldest first.
    fn find_all(&self) -> Result<Vec<Job>, StoreError>;

    /// Jobs in `state`, in the order they entered that state (FIFO).
    fn find_by_state(&self, state: JobState) -> Result<Vec<Job>, StoreError>;

    /// Insert or update.
    fn save(&self, job: &Job) -> Result<(), StoreError>;

    /// Delete every job together with its attempts.
    fn purge_all(&self) -> Result<(), StoreError>;

    /// Return a copy of `job` with its attempts populated, oldest first.
    fn load_children(&self, job: &Job) -> Result<Job, StoreError>;
}

/// Durable storage for attempts.
pub trait AttemptStore: Send + Sync {
    /// The attempt with the highest sequence number for `job_id`.
    fn find_latest_for_job(&self, job_id: JobId) -> Result<Option<Attempt>, StoreError>;

    /// Insert or update.
    fn save(&self, attempt: &Attempt) -> Result<(), StoreError>;

    /// Delete every attempt.
    fn purge_all(&self) -> Result<(), StoreError>;
}

impl<T: JobStore + ?Sized> JobStore for Arc<T> {
    fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        (**self).find_by_id(id)
    }

    fn find_all(&self) -> Result<Vec<Job>, StoreError> {
        (**self).find_all()
    }

    fn find_by_state(&self, state: JobState) -> Result<Vec<Job>, StoreError> {
        (**self).find_by_state(state)
    }

    fn save(&self, job: &Job) -> Result<(), StoreError> {
        (**self).save(job)
    }

    fn purge_all(&self) -> Result<(), StoreError> {
        (**self).purge_all()
    }

    fn load_children(&self, job: &Job) -> Result<Job, StoreError> {
        (**self).load_children(job)
    }
}

impl<T: AttemptStore + ?Sized> AttemptStore for Arc<T> {
    fn find_latest_for_job(&self, job_id: JobId) -> Result<Option<Attempt>, StoreError> {
        (**self).find_latest_for_job(job_id)
    }

    fn save(&self, attempt: &Attempt) -> Result<(), StoreError> {
        (**self).save(attempt)
    }

    fn purge_all(&self) -> Result<(), StoreError> {
        (**self).purge_all()
    }
}
