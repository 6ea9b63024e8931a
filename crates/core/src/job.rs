//! Transfer jobs and their state machine.
//!
//! ```text
//! CREATED ──enqueue──▶ ENQUEUED ──begin_processing──▶ PROCESSING ──┬─complete─▶ COMPLETE
//!                         ▲                                        └─fail─────▶ ERROR
//!                         └──────────────restart──────────────── COMPLETE | ERROR
//! ```
//!
//! No transition skips PROCESSING. Entering PROCESSING is only legal from
//! ENQUEUED; who may make that move (one job at a time) is decided outside the
//! domain, by the execution gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::attempt::Attempt;
use crate::error::{DomainError, DomainResult};
use crate::id::JobId;

/// Lifecycle state of a job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    Enqueued,
    Processing,
    Complete,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Error)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (*self, next),
            (Created, Enqueued)
                | (Enqueued, Processing)
                | (Processing, Complete)
                | (Processing, Error)
                | (Complete, Enqueued)
                | (Error, Enqueued)
        )
    }
}

impl core::fmt::Display for JobState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            JobState::Created => "CREATED",
            JobState::Enqueued => "ENQUEUED",
            JobState::Processing => "PROCESSING",
            JobState::Complete => "COMPLETE",
            JobState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Direction of a transfer relative to the storage grid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// Local file or directory uploaded into the grid.
    Put,
    /// Grid data downloaded to the local filesystem.
    Get,
    /// Grid data replicated onto another storage resource.
    Replicate,
    /// Grid-to-grid copy.
    Copy,
    /// Local tree synchronised into a grid collection.
    Synch,
}

impl TransferKind {
    /// Whether the source location is a grid (absolute logical) path.
    pub fn source_is_grid(&self) -> bool {
        matches!(self, TransferKind::Get | TransferKind::Replicate | TransferKind::Copy)
    }

    /// Whether the target location is a grid (absolute logical) path.
    ///
    /// A replication target names a storage resource, not a path.
    pub fn target_is_grid(&self) -> bool {
        matches!(self, TransferKind::Put | TransferKind::Copy | TransferKind::Synch)
    }
}

impl core::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            TransferKind::Put => "put",
            TransferKind::Get => "get",
            TransferKind::Replicate => "replicate",
            TransferKind::Copy => "copy",
            TransferKind::Synch => "synch",
        };
        f.write_str(s)
    }
}

/// A queued transfer between a source and a target location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: TransferKind,
    pub source_path: String,
    pub target_path: String,
    /// Owner, attached once at enqueue time.
    pub account: Option<Account>,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Child attempts. Only populated when explicitly loaded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<Attempt>,
}

impl Job {
    pub fn new(
        kind: TransferKind,
        source_path: impl Into<String>,
        target_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            source_path: source_path.into(),
            target_path: target_path.into(),
            account: None,
            state: JobState::Created,
            created_at: now,
            updated_at: now,
            attempts: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    pub fn assign_account(&mut self, account: Account) {
        self.account = Some(account);
    }

    /// CREATED → ENQUEUED.
    pub fn enqueue(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.state != JobState::Created {
            return Err(DomainError::illegal_transition(self.state, JobState::Enqueued));
        }
        self.transition(JobState::Enqueued, now)
    }

    /// ENQUEUED → PROCESSING.
    pub fn begin_processing(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(JobState::Processing, now)
    }

    /// PROCESSING → COMPLETE.
    pub fn complete(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(JobState::Complete, now)
    }

    /// PROCESSING → ERROR.
    pub fn fail(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(JobState::Error, now)
    }

    /// COMPLETE | ERROR → ENQUEUED.
    pub fn restart(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.state.is_terminal() {
            return Err(DomainError::illegal_transition(self.state, JobState::Enqueued));
        }
        self.transition(JobState::Enqueued, now)
    }

    fn transition(&mut self, next: JobState, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::illegal_transition(self.state, next));
        }
        self.state = next;
        self.updated_at = now;
        Ok(())
    }
}
