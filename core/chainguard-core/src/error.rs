//! Error types for chainguard-core operations.
//!
//! Handlers convert these into prose chunks for the agent; the dispatcher
//! maps anything that escapes into a single `INTERNAL` diagnostic. Nothing
//! here should ever cross the wire as a panic.

use std::path::PathBuf;

/// All errors that can occur in core operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainguardError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("path is outside the project root: {0}")]
    PathUnsafe(PathBuf),

    #[error("no active scope")]
    ScopeMissing,

    #[error("syntax check failed: {0}")]
    SyntaxFail(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("I/O failure: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("subprocess failed: {0}")]
    Subprocess(String),

    #[error("database error: {0}")]
    Db(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("enforcement snapshot is stale: {0}")]
    SnapshotStale(String),

    #[error("blocked by alert: {0}")]
    BlockedByAlert(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChainguardError {
    /// Short machine-matchable code, used as the error marker in responses.
    pub fn code(&self) -> &'static str {
        match self {
            ChainguardError::InvalidInput(_) => "INVALID_INPUT",
            ChainguardError::PathUnsafe(_) => "PATH_UNSAFE",
            ChainguardError::ScopeMissing => "SCOPE_MISSING",
            ChainguardError::SyntaxFail(_) => "SYNTAX_FAIL",
            ChainguardError::Timeout(_) => "TIMEOUT",
            ChainguardError::Io { .. } => "IO_FAIL",
            ChainguardError::Json { .. } => "IO_FAIL",
            ChainguardError::Subprocess(_) => "SUBPROCESS_FAIL",
            ChainguardError::Db(_) => "DB_FAIL",
            ChainguardError::Http(_) => "HTTP_FAIL",
            ChainguardError::AuthRequired(_) => "AUTH_REQUIRED",
            ChainguardError::SnapshotStale(_) => "SNAPSHOT_STALE",
            ChainguardError::BlockedByAlert(_) => "BLOCKED_BY_ALERT",
            ChainguardError::UnknownTool(_) => "UNKNOWN_TOOL",
            ChainguardError::Internal(_) => "INTERNAL",
        }
    }

    /// Attach context to an I/O error.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ChainguardError::Io {
            context: context.into(),
            source,
        }
    }

    /// Attach context to a JSON error.
    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        ChainguardError::Json {
            context: context.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for ChainguardError {
    fn from(err: reqwest::Error) -> Self {
        ChainguardError::Http(err.to_string())
    }
}

/// Convenience type alias for Results using ChainguardError.
pub type Result<T> = std::result::Result<T, ChainguardError>;
