//! Logging utilities for structured tracing

use crate::error::FetchError;
use std::time::Instant;

/// Track operation timing and log on drop
pub struct Timer {
    start: Instant,
    operation: &'static str,
    url: String,
}

impl Timer {
    /// Create a new timer for an operation on a URL
    pub fn new(operation: &'static str, url: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            operation,
            url: url.into(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_millis() as u64;
        tracing::debug!(
            operation = self.operation,
            url = %self.url,
            duration_ms = duration_ms,
            "Operation completed"
        );
    }
}

/// Log a failed URL lookup with structured context
pub fn log_fetch_error(operation: &str, url: &str, error: &FetchError) {
    tracing::warn!(
        operation = %operation,
        url = %url,
        error = %error,
        error_kind = error.kind(),
        "Operation failed"
    );
}
