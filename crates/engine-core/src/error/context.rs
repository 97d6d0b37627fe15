//! # Error Context Utilities
//!
//! Adds structured context to an [`EngineError`] before it's logged: which
//! partner/provider/event a failure belongs to, and a categorization used to
//! decide how far the failure propagates (row, event, partner, or process).

use super::{EngineError, ErrorCategory, ErrorMetadata, ErrorSeverity};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// An error bundled with metadata for logging.
#[derive(Debug)]
pub struct ErrorContext {
    pub error: EngineError,
    pub metadata: ErrorMetadata,
}

impl ErrorContext {
    pub fn new(error: EngineError) -> Self {
        let (category, severity, code) = categorize_error(&error);
        Self {
            error,
            metadata: ErrorMetadata::new(category, severity, code),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.metadata.context.insert(key.into(), json_value);
        }
        self
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "error": self.error.to_string(),
            "category": self.metadata.category,
            "severity": self.metadata.severity,
            "code": self.metadata.error_code,
            "context": self.metadata.context,
            "timestamp": self.metadata.timestamp,
        })
    }
}

/// Extension trait for attaching context inline at the error's call site.
pub trait ErrorContextExt: Sized {
    fn context(self, key: impl Into<String>, value: impl Serialize) -> ErrorContext;
    fn with_contexts(self, contexts: HashMap<String, Value>) -> ErrorContext;
}

impl ErrorContextExt for EngineError {
    fn context(self, key: impl Into<String>, value: impl Serialize) -> ErrorContext {
        ErrorContext::new(self).with_context(key, value)
    }

    fn with_contexts(self, contexts: HashMap<String, Value>) -> ErrorContext {
        let mut error_context = ErrorContext::new(self);
        for (key, value) in contexts {
            error_context.metadata.context.insert(key, value);
        }
        error_context
    }
}

/// Maps an [`EngineError`] to its propagation category per the error
/// taxonomy: row errors are absorbed by the caller, permanent errors abort
/// the partner, transient errors are retried, fatal errors abort the process.
pub fn categorize_error(error: &EngineError) -> (ErrorCategory, ErrorSeverity, String) {
    match error {
        EngineError::NetworkError { .. } => {
            (ErrorCategory::Transient, ErrorSeverity::Warning, "NET_001".to_string())
        }
        EngineError::Timeout { .. } => {
            (ErrorCategory::Transient, ErrorSeverity::Warning, "NET_002".to_string())
        }
        EngineError::RateLimited { .. } => {
            (ErrorCategory::Transient, ErrorSeverity::Info, "RATE_001".to_string())
        }
        EngineError::AuthError { .. } => {
            (ErrorCategory::Permanent, ErrorSeverity::Error, "AUTH_001".to_string())
        }
        EngineError::ProtocolError { .. } => {
            (ErrorCategory::Permanent, ErrorSeverity::Error, "PROTO_001".to_string())
        }
        EngineError::SchemaError { .. } => {
            (ErrorCategory::Permanent, ErrorSeverity::Critical, "SCHEMA_001".to_string())
        }
        EngineError::DataError { .. } => {
            (ErrorCategory::Row, ErrorSeverity::Warning, "DATA_001".to_string())
        }
        EngineError::IntegrityError { .. } => {
            (ErrorCategory::Row, ErrorSeverity::Warning, "INTEGRITY_001".to_string())
        }
        EngineError::DatabaseError { .. } => {
            (ErrorCategory::Transient, ErrorSeverity::Error, "DB_001".to_string())
        }
        EngineError::SchemaCheckFailed { .. } => {
            (ErrorCategory::Fatal, ErrorSeverity::Critical, "DB_002".to_string())
        }
        EngineError::ConfigError { .. } => {
            (ErrorCategory::Fatal, ErrorSeverity::Critical, "CONFIG_001".to_string())
        }
        EngineError::LockHeld { .. } => {
            (ErrorCategory::Fatal, ErrorSeverity::Critical, "LOCK_001".to_string())
        }
        EngineError::ValidationError { .. } => {
            (ErrorCategory::Row, ErrorSeverity::Warning, "VAL_001".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_error_categorizes_as_transient() {
        let error = EngineError::network("runsignup", "connection reset");
        let (category, _, _) = categorize_error(&error);
        assert_eq!(category, ErrorCategory::Transient);
    }

    #[test]
    fn schema_error_categorizes_as_permanent_critical() {
        let error = EngineError::SchemaError {
            message: "missing unique constraint".to_string(),
        };
        let (category, severity, _) = categorize_error(&error);
        assert_eq!(category, ErrorCategory::Permanent);
        assert_eq!(severity, ErrorSeverity::Critical);
    }

    #[test]
    fn context_builder_attaches_fields() {
        let ctx = EngineError::DataError {
            row_id: "p-123".to_string(),
            message: "unparseable date".to_string(),
        }
        .context("partner_id", "7");

        assert_eq!(
            ctx.metadata.context.get("partner_id"),
            Some(&serde_json::json!("7"))
        );
    }
}
