//! Single-permit execution gate.
//!
//! The gate models "one job executing now". It is a try-lock, not a queue:
//! losing callers return immediately and rely on a later trigger.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Last observed terminal status of a dispatch cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorStatus {
    Ok,
    Error,
}

impl ErrorStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ErrorStatus::Ok,
            _ => ErrorStatus::Error,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ErrorStatus::Ok => 0,
            ErrorStatus::Error => 1,
        }
    }
}

#[derive(Debug)]
pub struct ExecutionGate {
    held: AtomicBool,
    error_status: AtomicU8,
}

impl Default for ExecutionGate {
    fn default() -> Self {
        Self {
            held: AtomicBool::new(false),
            error_status: AtomicU8::new(ErrorStatus::Ok.as_u8()),
        }
    }
}

impl ExecutionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Set `held` if it was clear. Never blocks.
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear `held`. Idempotent.
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    pub fn set_error_status(&self, status: ErrorStatus) {
        self.error_status.store(status.as_u8(), Ordering::Release);
    }

    pub fn error_status(&self) -> ErrorStatus {
        ErrorStatus::from_u8(self.error_status.load(Ordering::Acquire))
    }

    /// Acquire the gate as an owned permit that releases on drop.
    pub fn try_permit(self: &Arc<Self>) -> Option<GatePermit> {
        if self.try_acquire() {
            Some(GatePermit {
                gate: Arc::clone(self),
            })
        } else {
            None
        }
    }
}

/// Proof of holding the gate. Move-only; dropping it releases the gate.
#[derive(Debug)]
#[must_use = "dropping a permit releases the gate"]
pub struct GatePermit {
    gate: Arc<ExecutionGate>,
}

impl GatePermit {
    pub fn gate(&self) -> &ExecutionGate {
        &self.gate
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
