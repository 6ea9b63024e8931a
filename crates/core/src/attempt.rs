//! Execution attempts of a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{AttemptId, JobId};

/// How an attempt ended (or that it has not ended yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum AttemptOutcome {
    /// Not finished: either waiting for hand-off or running.
    Pending,
    Succeeded,
    Failed { message: String },
    /// The process died while the attempt was running.
    Interrupted,
}

impl AttemptOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptOutcome::Pending)
    }
}

/// One execution record belonging to exactly one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub job_id: JobId,
    /// 1-based position among the job's attempts.
    pub sequence: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: AttemptOutcome,
}

impl Attempt {
    pub fn new(job_id: JobId, sequence: u32) -> Self {
        Self {
            id: AttemptId::new(),
            job_id,
            sequence,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            outcome: AttemptOutcome::Pending,
        }
    }

    /// Build the attempt that follows `previous` (or the first one).
    pub fn next_for(job_id: JobId, previous: Option<&Attempt>) -> Self {
        let sequence = previous.map(|a| a.sequence + 1).unwrap_or(1);
        Self::new(job_id, sequence)
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }

    /// Stamp the start time. Restamping an open attempt is allowed; a failed
    /// dispatch cycle may have stamped it without handing it off.
    pub fn start(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.is_terminal() {
            return Err(DomainError::invariant(format!(
                "attempt {} already ended",
                self.id
            )));
        }
        self.started_at = Some(now);
        Ok(())
    }

    /// Write the terminal fields.
    pub fn finish(&mut self, now: DateTime<Utc>, outcome: AttemptOutcome) -> DomainResult<()> {
        if self.is_terminal() {
            return Err(DomainError::invariant(format!(
                "attempt {} already ended",
                self.id
            )));
        }
        if !outcome.is_terminal() {
            return Err(DomainError::invariant("an attempt cannot finish as pending"));
        }
        self.ended_at = Some(now);
        self.outcome = outcome;
        Ok(())
    }

    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }
}
