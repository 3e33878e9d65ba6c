//! Storage error types.
//!
//! Every variant carries enough context to diagnose the failing call
//! without a debugger. Credentials never appear in error messages.

/// Errors that can occur while talking to a remote collection backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend rejected the account credentials (HTTP 401/403).
    #[error("backend rejected credentials during {operation}: {reason}")]
    Auth { operation: String, reason: String },

    /// The requested collection or file does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The backend answered with a non-success status.
    #[error("backend API error {status} during {operation}: {message}")]
    Api {
        operation: String,
        status: u16,
        message: String,
    },

    /// The request never produced a response (DNS, TLS, connection reset).
    #[error("network error during {operation}: {reason}")]
    Network { operation: String, reason: String },

    /// The request exceeded the configured timeout.
    #[error("request timed out during {operation}")]
    Timeout { operation: String },

    /// The backend answered, but the body was not what the API promises.
    #[error("invalid response during {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },
}

impl StorageError {
    /// Whether this error means the account credentials were refused.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}
