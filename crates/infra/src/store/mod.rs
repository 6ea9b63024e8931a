//! Job and attempt persistence.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryJobStore;
pub use r#trait::{AttemptStore, JobStore, StoreError};
