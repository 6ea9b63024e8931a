//! Error taxonomy of the queue dispatcher.

use thiserror::Error;

use conveyor_core::{DomainError, JobId, JobState};

use crate::backend::BackendError;
use crate::store::StoreError;

/// Why a job was vetoed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error("duplicate job: {0}")]
    Duplicate(String),

    #[error("malformed job: {0}")]
    Malformed(String),

    #[error("no prior attempt")]
    NoPriorAttempt,

    #[error("job in state {0} cannot be restarted")]
    NotRestartable(JobState),

    #[error("{0}")]
    Policy(String),
}

/// Error returned by a rejection policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("rejected: {0}")]
    Rejected(RejectionReason),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PolicyError {
    pub fn duplicate(msg: impl Into<String>) -> Self {
        Self::Rejected(RejectionReason::Duplicate(msg.into()))
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Rejected(RejectionReason::Malformed(msg.into()))
    }

    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Rejected(RejectionReason::Policy(msg.into()))
    }
}

/// Error surfaced by the dispatcher.
#[derive(Debug, Error)]
pub enum ConveyorError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("job rejected: {0}")]
    Rejected(RejectionReason),

    #[error("account resolution failed: {0}")]
    AccountResolution(String),

    #[error("execution gate is busy")]
    Busy,

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A store failure while the gate was held for a bulk operation.
    #[error("execution failed: {0}")]
    Execution(#[source] StoreError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl ConveyorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, ConveyorError::Rejected(_))
    }
}

impl From<DomainError> for ConveyorError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::IllegalTransition { .. } => Self::InvariantViolation(err.to_string()),
            DomainError::InvariantViolation(msg) => Self::InvariantViolation(msg),
        }
    }
}

impl From<PolicyError> for ConveyorError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Rejected(reason) => Self::Rejected(reason),
            PolicyError::Store(e) => Self::Store(e),
        }
    }
}
