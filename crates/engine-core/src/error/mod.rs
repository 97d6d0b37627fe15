//! # Error Handling Framework
//!
//! Builds on [`EngineError`] with categorization, structured metadata, and a
//! pluggable handler used for consistent logging at the point an error is
//! first observed.

pub mod context;
pub mod types;

pub use context::{ErrorContext, ErrorContextExt};
pub use types::EngineError;

use serde::{Deserialize, Serialize};

/// Error severity levels for monitoring and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Error categories used to decide propagation scope (row / event / partner / run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// May succeed on retry (network, timeout).
    Transient,
    /// Won't succeed on retry within this run (auth, schema).
    Permanent,
    /// Bad input data (a single row).
    Row,
    /// Infrastructure/config failure that aborts the process.
    Fatal,
}

/// Error metadata attached at the point an error is logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetadata {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub error_code: String,
    pub context: std::collections::HashMap<String, serde_json::Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorMetadata {
    pub fn new(category: ErrorCategory, severity: ErrorSeverity, error_code: String) -> Self {
        Self {
            category,
            severity,
            error_code,
            context: std::collections::HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.context.insert(key.into(), json_value);
        }
        self
    }
}

/// Result type aliased to [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error handler trait, used so log output stays consistent across the
/// executor, discovery worker, and scheduler without each one hand-rolling
/// its own `tracing::error!` call site.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, error: &EngineError, metadata: &ErrorMetadata);
}

/// Default handler: a single structured `tracing::error!` per call.
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle_error(&self, error: &EngineError, metadata: &ErrorMetadata) {
        tracing::error!(
            error = %error,
            category = ?metadata.category,
            severity = ?metadata.severity,
            error_code = %metadata.error_code,
            "engine error"
        );
    }
}

static ERROR_HANDLER: std::sync::OnceLock<Box<dyn ErrorHandler>> = std::sync::OnceLock::new();

pub fn set_error_handler(handler: Box<dyn ErrorHandler>) {
    ERROR_HANDLER.set(handler).ok();
}

pub fn error_handler() -> &'static dyn ErrorHandler {
    ERROR_HANDLER
        .get_or_init(|| Box::new(DefaultErrorHandler))
        .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_carries_context() {
        let metadata = ErrorMetadata::new(
            ErrorCategory::Transient,
            ErrorSeverity::Warning,
            "NET_001".to_string(),
        )
        .with_context("partner_id", "42");

        assert_eq!(metadata.category, ErrorCategory::Transient);
        assert!(metadata.context.contains_key("partner_id"));
    }
}
