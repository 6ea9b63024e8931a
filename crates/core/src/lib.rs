//! `conveyor-core`: domain building blocks of the transfer queue.
//!
//! This crate contains **pure domain** types (no storage, no threads, no IO):
//! identifiers, jobs and attempts with their state machines, and the
//! credential/account records that own jobs.

pub mod account;
pub mod attempt;
pub mod error;
pub mod id;
pub mod job;

pub use account::{Account, Credential};
pub use attempt::{Attempt, AttemptOutcome};
pub use error::{DomainError, DomainResult};
pub use id::{AccountId, AttemptId, JobId};
pub use job::{Job, JobState, TransferKind};
