//! Tracing and logging setup shared by the conveyor binaries.

/// Initialize process-wide tracing at the default `info` level.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init("info");
}

/// Initialize process-wide tracing with `level` as the fallback filter.
///
/// `RUST_LOG` still wins when it is set.
pub fn init_with_level(level: &str) {
    tracing::init(level);
}

/// Subscriber configuration (filters, formatting).
pub mod tracing;
