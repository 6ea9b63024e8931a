//! Infrastructure layer: execution gate, stores, dispatcher, config.

pub mod accounts;
pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod hooks;
pub mod listener;
pub mod policy;
pub mod store;
pub mod timer;

#[cfg(test)]
mod testing;

pub use accounts::{AccountResolver, InMemoryAccountResolver};
pub use backend::{
    BackendError, CompletionHandle, Dispatch, ExecutionBackend, InlineBackend, ThreadedBackend,
    TransferOutcome,
};
pub use config::{ConfigError, ConveyorConfig, RecoveryMode};
pub use dispatcher::{DequeueOutcome, QueueDispatcher, RecoveryReport};
pub use error::{ConveyorError, PolicyError, RejectionReason};
pub use gate::{ErrorStatus, ExecutionGate, GatePermit};
pub use hooks::{NoopHook, PendingAttemptHook, PreparationHook};
pub use listener::{FailureListener, TracingFailureListener};
pub use policy::{
    AcceptAll, CompositePolicy, DuplicateJobPolicy, MalformedPathPolicy, RejectionPolicy,
    StandardRejectionPolicy,
};
pub use store::{AttemptStore, InMemoryJobStore, JobStore, StoreError};
pub use timer::{DispatchTimer, DispatchTimerHandle};
