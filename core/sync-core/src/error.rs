//! Error types for bookmark sync operations.

use std::path::PathBuf;

use bookmark_sync_protocol::ErrorInfo;

/// Failure reported by an external collaborator (auth, data store, realtime).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct BackendError {
    pub code: String,
    pub message: String,
}

impl BackendError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<ErrorInfo> for BackendError {
    fn from(info: ErrorInfo) -> Self {
        Self {
            code: info.code,
            message: info.message,
        }
    }
}

/// All errors that can occur in sync operations.
///
/// None of these are fatal: the worst outcome is a stale or empty local view.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    // ─────────────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Auth error: {0}")]
    Auth(#[source] BackendError),

    #[error("Session check timed out after {0}ms")]
    AuthTimeout(u64),

    #[error("Operation requires an authenticated session")]
    NotAuthenticated,

    // ─────────────────────────────────────────────────────────────────────
    // Data Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Bulk load of {collection} failed: {source}")]
    Fetch {
        collection: String,
        #[source]
        source: BackendError,
    },

    #[error("Validation failed: {field} must not be empty")]
    Validation { field: &'static str },

    #[error("Mutation failed: {action}: {source}")]
    Mutation {
        action: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("Realtime channel {channel} failed: {source}")]
    Channel {
        channel: String,
        #[source]
        source: BackendError,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration read failed: {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Home directory not found")]
    HomeDirNotFound,
}

/// Convenience type alias for Results using SyncError.
pub type Result<T> = std::result::Result<T, SyncError>;

impl From<SyncError> for String {
    fn from(err: SyncError) -> String {
        err.to_string()
    }
}
