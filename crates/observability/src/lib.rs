//! Tracing and logging setup shared by every labstock binary.

/// Initialize process-wide logging with default settings.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(&LogSettings::default());
}

/// Initialize process-wide logging from loaded configuration.
pub fn init_with(settings: &LogSettings) {
    tracing::init(settings);
}

/// Tracing configuration (filters, formats).
pub mod tracing;

pub use tracing::{LogFormat, LogSettings};
