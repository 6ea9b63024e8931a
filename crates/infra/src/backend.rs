//! Execution backends and the completion contract.
//!
//! The dispatcher hands a backend a [`Dispatch`]: the job, the started attempt
//! and a [`CompletionHandle`] that owns the gate permit. Whoever finishes the
//! transfer calls [`CompletionHandle::complete`], which writes the terminal
//! records and releases the gate. A handle that is dropped without completing
//! (a panic, a refused hand-off) finishes the job as failed.

use std::sync::{Arc, Mutex};
use std::thread;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use conveyor_core::{Attempt, AttemptId, AttemptOutcome, Job, JobId};

use crate::error::ConveyorError;
use crate::gate::{ErrorStatus, GatePermit};
use crate::store::{AttemptStore, JobStore};

/// Outcome message recorded when a handle is dropped without completing.
pub const ABANDONED: &str = "abandoned before completion";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to spawn transfer worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("hand-off refused: {0}")]
    Refused(String),
}

/// Terminal result of a transfer as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success,
    Failure(String),
}

/// Everything a backend needs to run one attempt.
#[derive(Debug)]
pub struct Dispatch {
    pub job: Job,
    pub attempt: Attempt,
    pub completion: CompletionHandle,
}

/// Completion callback owned by the gate holder.
pub struct CompletionHandle {
    permit: Option<GatePermit>,
    job_id: JobId,
    attempt_id: AttemptId,
    jobs: Arc<dyn JobStore>,
    attempts: Arc<dyn AttemptStore>,
}

impl std::fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("job_id", &self.job_id)
            .field("attempt_id", &self.attempt_id)
            .field("pending", &self.permit.is_some())
            .finish()
    }
}

impl CompletionHandle {
    pub(crate) fn new(
        permit: GatePermit,
        job_id: JobId,
        attempt_id: AttemptId,
        jobs: Arc<dyn JobStore>,
        attempts: Arc<dyn AttemptStore>,
    ) -> Self {
        Self {
            permit: Some(permit),
            job_id,
            attempt_id,
            jobs,
            attempts,
        }
    }

    /// Record the terminal outcome and release the gate.
    ///
    /// The gate is released even when persisting fails; the job is then left
    /// in PROCESSING and settled by the next dispatch cycle.
    pub fn complete(mut self, outcome: TransferOutcome) -> Result<Job, ConveyorError> {
        self.finish(outcome)
    }

    fn finish(&mut self, outcome: TransferOutcome) -> Result<Job, ConveyorError> {
        let Some(permit) = self.permit.take() else {
            return Err(ConveyorError::invariant(format!(
                "attempt {} already completed",
                self.attempt_id
            )));
        };

        let status = match outcome {
            TransferOutcome::Success => ErrorStatus::Ok,
            TransferOutcome::Failure(_) => ErrorStatus::Error,
        };

        let result = self.persist(outcome);
        match &result {
            Ok(job) => {
                permit.gate().set_error_status(status);
                info!(
                    job_id = %job.id,
                    attempt_id = %self.attempt_id,
                    state = %job.state,
                    "transfer finished"
                );
            }
            Err(e) => {
                permit.gate().set_error_status(ErrorStatus::Error);
                error!(
                    job_id = %self.job_id,
                    attempt_id = %self.attempt_id,
                    error = %e,
                    "failed to record transfer outcome"
                );
            }
        }
        drop(permit);
        result
    }

    fn persist(&self, outcome: TransferOutcome) -> Result<Job, ConveyorError> {
        let now = Utc::now();
        let mut job = self
            .jobs
            .find_by_id(self.job_id)?
            .ok_or(ConveyorError::NotFound(self.job_id))?;
        let mut attempt = self
            .attempts
            .find_latest_for_job(self.job_id)?
            .filter(|a| a.id == self.attempt_id)
            .ok_or_else(|| {
                ConveyorError::invariant(format!(
                    "attempt {} is no longer the latest for job {}",
                    self.attempt_id, self.job_id
                ))
            })?;

        match outcome {
            TransferOutcome::Success => {
                attempt.finish(now, AttemptOutcome::Succeeded)?;
                job.complete(now)?;
            }
            TransferOutcome::Failure(message) => {
                attempt.finish(now, AttemptOutcome::Failed { message })?;
                job.fail(now)?;
            }
        }

        self.attempts.save(&attempt)?;
        self.jobs.save(&job)?;
        Ok(job)
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        if self.permit.is_none() {
            return;
        }
        warn!(
            job_id = %self.job_id,
            attempt_id = %self.attempt_id,
            "completion handle dropped without an outcome"
        );
        // Errors are already logged by `finish`.
        let _ = self.finish(TransferOutcome::Failure(ABANDONED.to_string()));
    }
}

/// Performs the actual transfer of a dispatched attempt.
///
/// Returning `Err` means the hand-off did not happen; the backend must not
/// keep the [`Dispatch`] in that case.
pub trait ExecutionBackend: Send + Sync {
    fn process(&self, dispatch: Dispatch) -> Result<(), BackendError>;
}

/// Transfer function type.
pub type TransferFn = Arc<dyn Fn(&Job, &Attempt) -> Result<(), String> + Send + Sync>;

fn run_transfer(transfer: &TransferFn, dispatch: Dispatch) {
    let Dispatch {
        job,
        attempt,
        completion,
    } = dispatch;

    info!(
        job_id = %job.id,
        attempt_id = %attempt.id,
        kind = %job.kind,
        source = %job.source_path,
        target = %job.target_path,
        "transfer started"
    );

    let outcome = match transfer(&job, &attempt) {
        Ok(()) => TransferOutcome::Success,
        Err(message) => TransferOutcome::Failure(message),
    };

    // Errors are already logged by the handle.
    let _ = completion.complete(outcome);
}

/// Runs each transfer on its own named background thread.
pub struct ThreadedBackend {
    transfer: TransferFn,
    name: String,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ThreadedBackend {
    pub fn new<F>(transfer: F) -> Self
    where
        F: Fn(&Job, &Attempt) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            transfer: Arc::new(transfer),
            name: "conveyor-transfer".to_string(),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Join every transfer thread spawned so far.
    pub fn wait_idle(&self) {
        let workers = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };
        for worker in workers {
            if worker.join().is_err() {
                warn!(backend = %self.name, "transfer thread panicked");
            }
        }
    }
}

impl ExecutionBackend for ThreadedBackend {
    fn process(&self, dispatch: Dispatch) -> Result<(), BackendError> {
        let transfer = Arc::clone(&self.transfer);
        let worker = thread::Builder::new()
            .name(format!("{}-{}", self.name, dispatch.attempt.sequence))
            .spawn(move || run_transfer(&transfer, dispatch))?;

        if let Ok(mut workers) = self.workers.lock() {
            workers.retain(|w| !w.is_finished());
            workers.push(worker);
        }
        Ok(())
    }
}

/// Runs the transfer on the dispatching thread.
pub struct InlineBackend {
    transfer: TransferFn,
}

impl InlineBackend {
    pub fn new<F>(transfer: F) -> Self
    where
        F: Fn(&Job, &Attempt) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            transfer: Arc::new(transfer),
        }
    }

    /// A backend whose transfers always succeed.
    pub fn succeeding() -> Self {
        Self::new(|_, _| Ok(()))
    }
}

impl ExecutionBackend for InlineBackend {
    fn process(&self, dispatch: Dispatch) -> Result<(), BackendError> {
        run_transfer(&self.transfer, dispatch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ExecutionGate;
    use crate::store::InMemoryJobStore;
    use conveyor_core::{JobState, TransferKind};

    struct Fixture {
        store: Arc<InMemoryJobStore>,
        gate: Arc<ExecutionGate>,
        job: Job,
        attempt: Attempt,
    }

    /// A job already moved to PROCESSING with a started attempt.
    fn processing() -> Fixture {
        let store = InMemoryJobStore::arc();
        let gate = ExecutionGate::arc();
        let now = Utc::now();

        let mut job = Job::new(TransferKind::Get, "/tempZone/home/rods/a", "/tmp/a");
        job.enqueue(now).unwrap();
        job.begin_processing(now).unwrap();
        JobStore::save(store.as_ref(), &job).unwrap();

        let mut attempt = Attempt::new(job.id, 1);
        attempt.start(now).unwrap();
        AttemptStore::save(store.as_ref(), &attempt).unwrap();

        Fixture {
            store,
            gate,
            job,
            attempt,
        }
    }

    fn handle(f: &Fixture) -> CompletionHandle {
        let permit = f.gate.try_permit().unwrap();
        CompletionHandle::new(
            permit,
            f.job.id,
            f.attempt.id,
            f.store.clone(),
            f.store.clone(),
        )
    }

    #[test]
    fn success_completes_job_and_releases_gate() {
        let f = processing();
        let job = handle(&f).complete(TransferOutcome::Success).unwrap();

        assert_eq!(job.state, JobState::Complete);
        assert!(!f.gate.is_held());
        assert_eq!(f.gate.error_status(), ErrorStatus::Ok);

        let attempt = f.store.find_latest_for_job(f.job.id).unwrap().unwrap();
        assert_eq!(attempt.outcome, AttemptOutcome::Succeeded);
        assert!(attempt.ended_at.is_some());
    }

    #[test]
    fn failure_marks_error_status() {
        let f = processing();
        let job = handle(&f)
            .complete(TransferOutcome::Failure("checksum mismatch".into()))
            .unwrap();

        assert_eq!(job.state, JobState::Error);
        assert_eq!(f.gate.error_status(), ErrorStatus::Error);
        let attempt = f.store.find_latest_for_job(f.job.id).unwrap().unwrap();
        assert_eq!(
            attempt.outcome,
            AttemptOutcome::Failed {
                message: "checksum mismatch".into()
            }
        );
    }

    #[test]
    fn dropped_handle_fails_the_job() {
        let f = processing();
        drop(handle(&f));

        assert!(!f.gate.is_held());
        let job = f.store.find_by_id(f.job.id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Error);
        let attempt = f.store.find_latest_for_job(f.job.id).unwrap().unwrap();
        assert_eq!(
            attempt.outcome,
            AttemptOutcome::Failed {
                message: ABANDONED.into()
            }
        );
    }

    #[test]
    fn gate_is_released_when_the_job_vanished() {
        let f = processing();
        let h = handle(&f);
        JobStore::purge_all(f.store.as_ref()).unwrap();

        let err = h.complete(TransferOutcome::Success).unwrap_err();
        assert!(matches!(err, ConveyorError::NotFound(_)));
        assert!(!f.gate.is_held());
        assert_eq!(f.gate.error_status(), ErrorStatus::Error);
    }

    #[test]
    fn threaded_backend_completes_on_worker_thread() {
        let f = processing();
        let backend = ThreadedBackend::new(|_, _| Ok(())).with_name("test-transfer");
        backend
            .process(Dispatch {
                job: f.job.clone(),
                attempt: f.attempt.clone(),
                completion: handle(&f),
            })
            .unwrap();
        backend.wait_idle();

        assert!(!f.gate.is_held());
        let job = f.store.find_by_id(f.job.id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Complete);
    }

    #[test]
    fn inline_backend_reports_transfer_errors() {
        let f = processing();
        let backend = InlineBackend::new(|_, _| Err("connection refused".into()));
        backend
            .process(Dispatch {
                job: f.job.clone(),
                attempt: f.attempt.clone(),
                completion: handle(&f),
            })
            .unwrap();

        let job = f.store.find_by_id(f.job.id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Error);
        assert!(!f.gate.is_held());
    }
}
