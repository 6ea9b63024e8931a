//! Sinks for dispatch-cycle failures.

use tracing::error;

use crate::error::ConveyorError;

/// Best-effort sink for failures absorbed by the dispatcher.
///
/// Called once per failed dispatch cycle. Implementations must not panic.
pub trait FailureListener: Send + Sync {
    fn notify(&self, error: &ConveyorError);
}

/// Logs every failure at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFailureListener;

impl FailureListener for TracingFailureListener {
    fn notify(&self, err: &ConveyorError) {
        error!(error = %err, "dispatch cycle failed");
    }
}
