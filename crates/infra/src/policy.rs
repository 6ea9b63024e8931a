//! Pluggable rejection policies evaluated before a job is enqueued.

use std::sync::Arc;

use conveyor_core::{Job, JobState};

use crate::error::PolicyError;
use crate::store::JobStore;

/// Evaluates a candidate job and may veto it.
pub trait RejectionPolicy: Send + Sync {
    fn evaluate(&self, job: &Job) -> Result<(), PolicyError>;
}

/// Accepts every job.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl RejectionPolicy for AcceptAll {
    fn evaluate(&self, _job: &Job) -> Result<(), PolicyError> {
        Ok(())
    }
}

/// Rejects jobs whose locations cannot name a transfer endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct MalformedPathPolicy;

impl MalformedPathPolicy {
    fn check(side: &str, path: &str, grid: bool) -> Result<(), PolicyError> {
        if path.trim().is_empty() {
            return Err(PolicyError::malformed(format!("{side} path is empty")));
        }
        if path.contains('\0') {
            return Err(PolicyError::malformed(format!("{side} path contains NUL")));
        }
        if grid && !path.starts_with('/') {
            return Err(PolicyError::malformed(format!(
                "{side} grid path must be absolute: {path}"
            )));
        }
        Ok(())
    }
}

impl RejectionPolicy for MalformedPathPolicy {
    fn evaluate(&self, job: &Job) -> Result<(), PolicyError> {
        Self::check("source", &job.source_path, job.kind.source_is_grid())?;
        Self::check("target", &job.target_path, job.kind.target_is_grid())
    }
}

/// Rejects a new job already stored under the same id, or one that repeats
/// an active transfer (same kind, source and target). A restarting job is
/// never its own duplicate.
///
/// The check reads the store and the caller saves afterwards with no lock in
/// between, so two concurrent enqueues of the same transfer can both pass.
/// Sequential enqueues are always caught.
pub struct DuplicateJobPolicy {
    store: Arc<dyn JobStore>,
}

impl DuplicateJobPolicy {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }
}

impl RejectionPolicy for DuplicateJobPolicy {
    fn evaluate(&self, job: &Job) -> Result<(), PolicyError> {
        if job.state == JobState::Created && self.store.find_by_id(job.id)?.is_some() {
            return Err(PolicyError::duplicate(format!("job {} already exists", job.id)));
        }

        for state in [JobState::Enqueued, JobState::Processing] {
            let clash = self.store.find_by_state(state)?.into_iter().find(|other| {
                other.id != job.id
                    && other.kind == job.kind
                    && other.source_path == job.source_path
                    && other.target_path == job.target_path
            });
            if let Some(other) = clash {
                return Err(PolicyError::duplicate(format!(
                    "{} {} -> {} is already {} as job {}",
                    job.kind, job.source_path, job.target_path, other.state, other.id
                )));
            }
        }
        Ok(())
    }
}

/// Runs policies in order; the first veto wins.
#[derive(Default)]
pub struct CompositePolicy {
    policies: Vec<Arc<dyn RejectionPolicy>>,
}

impl CompositePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, policy: Arc<dyn RejectionPolicy>) -> Self {
        self.policies.push(policy);
        self
    }
}

impl RejectionPolicy for CompositePolicy {
    fn evaluate(&self, job: &Job) -> Result<(), PolicyError> {
        self.policies.iter().try_for_each(|p| p.evaluate(job))
    }
}

/// Malformed-path checks followed by duplicate detection.
pub struct StandardRejectionPolicy;

impl StandardRejectionPolicy {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(store: Arc<dyn JobStore>) -> CompositePolicy {
        CompositePolicy::new()
            .with(Arc::new(MalformedPathPolicy))
            .with(Arc::new(DuplicateJobPolicy::new(store)))
    }
}
