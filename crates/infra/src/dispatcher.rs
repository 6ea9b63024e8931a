//! Queue dispatcher.
//!
//! Composes the execution gate, the stores and the pluggable collaborators:
//! enqueue, restart, dequeue-and-drain, purge, crash recovery and read-only
//! listing. Every call runs synchronously on the caller's thread; the gate is
//! the only concurrency control.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use conveyor_core::{
    Attempt, AttemptId, AttemptOutcome, Credential, Job, JobId, JobState, TransferKind,
};

use crate::accounts::AccountResolver;
use crate::backend::{CompletionHandle, Dispatch, ExecutionBackend};
use crate::config::{ConveyorConfig, RecoveryMode};
use crate::error::{ConveyorError, RejectionReason};
use crate::gate::{ErrorStatus, ExecutionGate, GatePermit};
use crate::hooks::{PendingAttemptHook, PreparationHook};
use crate::listener::{FailureListener, TracingFailureListener};
use crate::policy::{RejectionPolicy, StandardRejectionPolicy};
use crate::store::{AttemptStore, JobStore};

/// Result of one `dequeue_next` call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DequeueOutcome {
    /// Another caller holds the gate. Expected, not an error.
    Busy,
    /// Nothing is ENQUEUED.
    Idle,
    /// The head job was handed to the backend.
    Dispatched { job_id: JobId, attempt_id: AttemptId },
    /// Every cycle of this call failed; the retry budget is spent.
    Halted { failures: u32 },
}

/// What the orphan sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Jobs whose succeeded attempt was recorded but whose COMPLETE write was lost.
    pub completed: Vec<JobId>,
    /// Jobs moved to ERROR.
    pub failed: Vec<JobId>,
    /// Jobs moved to ERROR and back to ENQUEUED.
    pub requeued: Vec<JobId>,
    pub interrupted_attempts: usize,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.failed.is_empty() && self.requeued.is_empty()
    }
}

pub struct QueueDispatcher {
    jobs: Arc<dyn JobStore>,
    attempts: Arc<dyn AttemptStore>,
    accounts: Arc<dyn AccountResolver>,
    backend: Arc<dyn ExecutionBackend>,
    policy: Arc<dyn RejectionPolicy>,
    listener: Arc<dyn FailureListener>,
    hook: Arc<dyn PreparationHook>,
    gate: Arc<ExecutionGate>,
    config: ConveyorConfig,
}

impl QueueDispatcher {
    /// Build a dispatcher with the standard rejection policy, the pending
    /// attempt hook, a tracing failure listener and a fresh gate.
    pub fn new(
        jobs: Arc<dyn JobStore>,
        attempts: Arc<dyn AttemptStore>,
        accounts: Arc<dyn AccountResolver>,
        backend: Arc<dyn ExecutionBackend>,
    ) -> Self {
        Self {
            policy: Arc::new(StandardRejectionPolicy::new(Arc::clone(&jobs))),
            hook: Arc::new(PendingAttemptHook::new(Arc::clone(&attempts))),
            listener: Arc::new(TracingFailureListener),
            gate: ExecutionGate::arc(),
            config: ConveyorConfig::default(),
            jobs,
            attempts,
            accounts,
            backend,
        }
    }

    pub fn with_rejection_policy(mut self, policy: Arc<dyn RejectionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_failure_listener(mut self, listener: Arc<dyn FailureListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_preparation_hook(mut self, hook: Arc<dyn PreparationHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_config(mut self, config: ConveyorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_gate(mut self, gate: Arc<ExecutionGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &Arc<ExecutionGate> {
        &self.gate
    }

    pub fn config(&self) -> &ConveyorConfig {
        &self.config
    }

    pub fn error_status(&self) -> ErrorStatus {
        self.gate.error_status()
    }

    /// Enqueue a new job owned by the account behind `credential`, then try
    /// to dispatch.
    ///
    /// Dispatch outcomes (busy, idle, halted) are logged and never surfaced.
    pub fn enqueue(&self, mut job: Job, credential: &Credential) -> Result<JobId, ConveyorError> {
        credential.validate()?;
        if job.state != JobState::Created {
            return Err(ConveyorError::validation(format!(
                "job {} is {}, only new jobs can be enqueued",
                job.id, job.state
            )));
        }

        let account = self.accounts.resolve(credential)?.ok_or_else(|| {
            ConveyorError::AccountResolution(format!("no account for {credential}"))
        })?;

        if let Err(err) = self.policy.evaluate(&job) {
            warn!(job_id = %job.id, error = %err, "job rejected");
            return Err(err.into());
        }

        job.assign_account(account);
        job.enqueue(Utc::now())?;
        self.jobs.save(&job)?;
        info!(
            job_id = %job.id,
            kind = %job.kind,
            source = %job.source_path,
            target = %job.target_path,
            "job enqueued"
        );

        self.hook.prepare_for_processing(&job)?;

        let outcome = self.dequeue_next();
        debug!(job_id = %job.id, ?outcome, "dequeue after enqueue");
        Ok(job.id)
    }

    /// Build a job from its locations and enqueue it.
    pub fn enqueue_by_locations(
        &self,
        source: impl Into<String>,
        target: impl Into<String>,
        credential: &Credential,
        kind: TransferKind,
    ) -> Result<JobId, ConveyorError> {
        self.enqueue(Job::new(kind, source, target), credential)
    }

    /// Put a finished job back in the queue. Does not dispatch.
    pub fn enqueue_restart(&self, job_id: JobId) -> Result<Job, ConveyorError> {
        let mut job = self
            .jobs
            .find_by_id(job_id)?
            .ok_or(ConveyorError::NotFound(job_id))?;

        if self.attempts.find_latest_for_job(job_id)?.is_none() {
            warn!(job_id = %job_id, "restart rejected, job has no prior attempt");
            return Err(ConveyorError::Rejected(RejectionReason::NoPriorAttempt));
        }
        if !job.state.is_terminal() {
            return Err(ConveyorError::Rejected(RejectionReason::NotRestartable(
                job.state,
            )));
        }
        self.policy.evaluate(&job)?;

        job.restart(Utc::now())?;
        self.jobs.save(&job)?;
        info!(job_id = %job.id, "job restarted");
        Ok(job)
    }

    /// Run dispatch cycles until one hands off, the queue is empty, the gate
    /// is busy or the retry budget is spent.
    ///
    /// A head whose cycle failed is passed over by later cycles of the same
    /// call while other ENQUEUED jobs remain.
    pub fn dequeue_next(&self) -> DequeueOutcome {
        let mut failures: u32 = 0;
        let mut tried = HashSet::new();

        loop {
            let Some(permit) = self.gate.try_permit() else {
                debug!("execution gate held, dequeue skipped");
                return DequeueOutcome::Busy;
            };
            self.gate.set_error_status(ErrorStatus::Ok);

            match self.dispatch_cycle(permit, &mut tried) {
                Ok(Some((job_id, attempt_id))) => {
                    return DequeueOutcome::Dispatched { job_id, attempt_id };
                }
                Ok(None) => {
                    debug!("no enqueued jobs");
                    return DequeueOutcome::Idle;
                }
                Err(err) => {
                    failures += 1;
                    warn!(error = %err, failures, "dispatch cycle failed, gate released");
                    self.listener.notify(&err);

                    if failures > self.config.max_dispatch_retries {
                        error!(
                            failures,
                            max_retries = self.config.max_dispatch_retries,
                            "dispatch retry budget exhausted, dispatcher halted"
                        );
                        return DequeueOutcome::Halted { failures };
                    }
                    thread::sleep(self.config.backoff_for(failures));
                }
            }
        }
    }

    /// One cycle: reconcile orphans, select the head, move it to PROCESSING,
    /// hand it off.
    ///
    /// On every error path the permit has been dropped (the gate released)
    /// and the error status set before this returns.
    fn dispatch_cycle(
        &self,
        permit: GatePermit,
        tried: &mut HashSet<JobId>,
    ) -> Result<Option<(JobId, AttemptId)>, ConveyorError> {
        let started = self
            .sweep_orphans(&permit)
            .and_then(|_| self.start_head(tried));
        let (job, attempt) = match started {
            Ok(Some(started)) => started,
            Ok(None) => return Ok(None),
            Err(err) => {
                permit.gate().set_error_status(ErrorStatus::Error);
                return Err(err);
            }
        };

        let ids = (job.id, attempt.id);
        let completion = CompletionHandle::new(
            permit,
            job.id,
            attempt.id,
            Arc::clone(&self.jobs),
            Arc::clone(&self.attempts),
        );

        // A refused hand-off drops the handle, which fails the job.
        self.backend.process(Dispatch {
            job,
            attempt,
            completion,
        })?;

        info!(job_id = %ids.0, attempt_id = %ids.1, "job handed to backend");
        Ok(Some(ids))
    }

    /// Move the first ENQUEUED job not yet tried by this call to PROCESSING,
    /// falling back to the FIFO head when every candidate has been tried.
    fn start_head(
        &self,
        tried: &mut HashSet<JobId>,
    ) -> Result<Option<(Job, Attempt)>, ConveyorError> {
        let enqueued = self.jobs.find_by_state(JobState::Enqueued)?;
        let next = enqueued
            .iter()
            .find(|j| !tried.contains(&j.id))
            .or_else(|| enqueued.first());
        let Some(mut job) = next.cloned() else {
            return Ok(None);
        };
        tried.insert(job.id);

        let mut attempt = match self.attempts.find_latest_for_job(job.id)? {
            Some(open) if !open.is_terminal() => open,
            previous => Attempt::next_for(job.id, previous.as_ref()),
        };

        let now = Utc::now();
        attempt.start(now)?;
        job.begin_processing(now)?;

        self.attempts.save(&attempt)?;
        self.jobs.save(&job)?;

        info!(
            job_id = %job.id,
            attempt_id = %attempt.id,
            sequence = attempt.sequence,
            "job processing"
        );
        Ok(Some((job, attempt)))
    }

    /// Delete every job and attempt. Fails with `Busy` while a job runs.
    pub fn purge_all(&self) -> Result<(), ConveyorError> {
        let permit = self.gate.try_permit().ok_or(ConveyorError::Busy)?;

        let result = self
            .jobs
            .purge_all()
            .and_then(|()| self.attempts.purge_all());
        drop(permit);

        result.map_err(ConveyorError::Execution)?;
        info!("all jobs and attempts purged");
        Ok(())
    }

    /// Reconcile jobs left in PROCESSING by a previous process.
    pub fn recover_orphans(&self) -> Result<RecoveryReport, ConveyorError> {
        let permit = self.gate.try_permit().ok_or(ConveyorError::Busy)?;
        self.sweep_orphans(&permit)
    }

    /// Any PROCESSING job seen while the gate is held has no running
    /// transfer: either a previous process died or its outcome write failed.
    fn sweep_orphans(&self, _permit: &GatePermit) -> Result<RecoveryReport, ConveyorError> {
        let mut report = RecoveryReport::default();

        for job in self.jobs.find_by_state(JobState::Processing)? {
            self.recover_orphan(job, &mut report)?;
        }

        if !report.is_empty() {
            info!(
                completed = report.completed.len(),
                failed = report.failed.len(),
                requeued = report.requeued.len(),
                "orphan sweep finished"
            );
        }
        Ok(report)
    }

    /// Settle one orphan from its latest attempt.
    ///
    /// A succeeded attempt completes the job and a failed one fails it. An
    /// open attempt is interrupted and the job failed or requeued per the
    /// recovery mode. A job with no attempt is always failed.
    fn recover_orphan(
        &self,
        mut job: Job,
        report: &mut RecoveryReport,
    ) -> Result<(), ConveyorError> {
        let now = Utc::now();

        match self.attempts.find_latest_for_job(job.id)? {
            Some(attempt) if attempt.outcome == AttemptOutcome::Succeeded => {
                job.complete(now)?;
                report.completed.push(job.id);
            }
            Some(mut open) if !open.is_terminal() => {
                open.finish(now, AttemptOutcome::Interrupted)?;
                self.attempts.save(&open)?;
                report.interrupted_attempts += 1;

                job.fail(now)?;
                if self.config.recovery_mode == RecoveryMode::Requeue {
                    job.restart(now)?;
                    report.requeued.push(job.id);
                } else {
                    report.failed.push(job.id);
                }
            }
            _ => {
                job.fail(now)?;
                report.failed.push(job.id);
            }
        }

        self.jobs.save(&job)?;
        warn!(job_id = %job.id, state = %job.state, "recovered orphaned job");
        Ok(())
    }

    /// Run the orphan sweep if configured, then drain any requeued jobs.
    pub fn startup(&self) -> Result<Option<RecoveryReport>, ConveyorError> {
        if !self.config.recover_on_startup {
            return Ok(None);
        }
        let report = self.recover_orphans()?;
        if !report.requeued.is_empty() {
            let outcome = self.dequeue_next();
            debug!(?outcome, "dequeue after recovery");
        }
        Ok(Some(report))
    }

    pub fn list_all(&self) -> Result<Vec<Job>, ConveyorError> {
        Ok(self.jobs.find_all()?)
    }

    pub fn find_by_id(&self, job_id: JobId) -> Result<Job, ConveyorError> {
        self.jobs
            .find_by_id(job_id)?
            .ok_or(ConveyorError::NotFound(job_id))
    }

    pub fn load_children(&self, job: &Job) -> Result<Job, ConveyorError> {
        Ok(self.jobs.load_children(job)?)
    }
}
