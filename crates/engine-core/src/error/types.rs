//! # Error Handling for the Provider Integration Engine
//!
//! [`EngineError`] is the single error type shared across every crate in the
//! workspace. Each variant corresponds to one entry in the error taxonomy:
//! per-row errors are carried as values through [`crate::models::RowResult`]
//! and never constructed here as a thrown error — only things that can abort
//! a sync, a partner, or the whole process get a variant.

use thiserror::Error;

/// Primary error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Credential is invalid or expired (provider returned 401/403).
    ///
    /// Non-retryable within the run: the partner is skipped and a `failed`
    /// sync-history row is recorded.
    #[error("authentication failed for provider {provider}: {message}")]
    AuthError { provider: String, message: String },

    /// Provider signalled quota exhaustion (HTTP 429 or provider-specific code).
    ///
    /// Handled by the rate limiter, not surfaced as a sync failure: the
    /// caller backs off and resumes the adapter's pagination sequence.
    #[error("rate limited by provider {provider}, retry after {retry_after_secs}s")]
    RateLimited {
        provider: String,
        retry_after_secs: u64,
    },

    /// Transient network failure (connection reset, DNS, etc).
    #[error("network error calling {provider}: {message}")]
    NetworkError { provider: String, message: String },

    /// A call exceeded its per-call timeout.
    #[error("timed out calling {provider} after {elapsed_secs}s")]
    Timeout { provider: String, elapsed_secs: u64 },

    /// Provider returned a response shape the adapter doesn't recognize.
    #[error("protocol error from {provider}: {message}")]
    ProtocolError { provider: String, message: String },

    /// The canonical store rejected a row: missing constraint, type mismatch.
    ///
    /// Never silently dropped. This aborts the sync.
    #[error("schema error: {message}")]
    SchemaError { message: String },

    /// A single row could not be parsed or normalized (unparseable date,
    /// malformed currency string, etc). The sync continues; the row is
    /// counted in `errors`.
    #[error("data error on row {row_id}: {message}")]
    DataError { row_id: String, message: String },

    /// Upsert produced a conflict the gateway didn't expect: duplicate
    /// despite the conflict clause, or a missing parent row.
    #[error("integrity error on row {row_id}: {message}")]
    IntegrityError { row_id: String, message: String },

    /// Generic database failure: connection, query, pool exhaustion.
    #[error("database error: {message}")]
    DatabaseError { message: String },

    /// A required uniqueness constraint or table is missing at startup.
    #[error("database schema check failed: {message}")]
    SchemaCheckFailed { message: String },

    /// Configuration is missing or malformed.
    #[error("configuration error: {message}")]
    ConfigError { message: String },

    /// Another instance already holds the scheduler lock.
    #[error("lock held: {message}")]
    LockHeld { message: String },

    /// Generic validation failure not covered by a more specific variant.
    #[error("validation error: {message}")]
    ValidationError { message: String },
}

impl EngineError {
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NetworkError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn protocol(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProtocolError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::DatabaseError {
            message: message.into(),
        }
    }

    /// Whether retrying the same call (after backoff) might succeed.
    ///
    /// `RateLimited` is handled separately by the rate limiter and is
    /// deliberately excluded here — it isn't retried by the generic backoff
    /// loop, it's resumed once the bucket refills.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::NetworkError { .. } | EngineError::Timeout { .. })
    }

    /// Whether this error should abort only the current sync, leaving the
    /// rest of the partner's work untouched.
    pub fn aborts_sync_only(&self) -> bool {
        matches!(
            self,
            EngineError::SchemaError { .. }
                | EngineError::ProtocolError { .. }
                | EngineError::NetworkError { .. }
                | EngineError::Timeout { .. }
        )
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(error: reqwest::Error) -> Self {
        let provider = error
            .url()
            .and_then(|u| u.host_str())
            .unwrap_or("unknown")
            .to_string();
        if error.is_timeout() {
            EngineError::Timeout {
                provider,
                elapsed_secs: 0,
            }
        } else {
            EngineError::NetworkError {
                provider,
                message: error.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::ProtocolError {
            provider: "unknown".to_string(),
            message: format!("JSON error: {error}"),
        }
    }
}

#[cfg(feature = "monitoring")]
impl From<prometheus::Error> for EngineError {
    fn from(error: prometheus::Error) -> Self {
        EngineError::ConfigError {
            message: format!("metrics error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_timeout_are_retryable() {
        let net = EngineError::network("runsignup", "connection reset");
        assert!(net.is_retryable());
        let timeout = EngineError::Timeout {
            provider: "haku".into(),
            elapsed_secs: 30,
        };
        assert!(timeout.is_retryable());
    }

    #[test]
    fn auth_error_is_not_retryable() {
        let auth = EngineError::auth("runsignup", "bad credentials");
        assert!(!auth.is_retryable());
    }

    #[test]
    fn rate_limited_is_not_retryable() {
        let rl = EngineError::RateLimited {
            provider: "haku".into(),
            retry_after_secs: 60,
        };
        assert!(!rl.is_retryable());
    }
}
