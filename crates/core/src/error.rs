//! Unified error types for the experimentation engine.
//!
//! Error codes:
//! - STORE_001-002: Identity storage errors
//! - NET_001-002: Transport errors (delivery sink, experiment source, assignment store)
//! - CFG_001: Invalid experiment configuration
//!
//! None of these ever reach UI callers. The client facade logs them and
//! degrades to "not in experiment" or a dropped event.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Storage error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// STORE_001: Storage is disabled or not reachable (private browsing)
    Unavailable,
    /// STORE_002: Stored value could not be read back
    Corrupt,
}

impl StorageErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable => "STORE_001",
            Self::Corrupt => "STORE_002",
        }
    }
}

/// Transport error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorCode {
    /// NET_001: Request could not be sent or timed out
    RequestFailed,
    /// NET_002: Remote answered with a non-success status
    BadStatus,
}

impl TransportErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RequestFailed => "NET_001",
            Self::BadStatus => "NET_002",
        }
    }
}

/// Unified error type for the experimentation engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage error with code.
    #[error("[{code}] {message}")]
    Storage {
        code: &'static str,
        message: String,
    },

    /// Transport error with code and optional HTTP status.
    #[error("[{code}] {message}")]
    Transport {
        code: &'static str,
        message: String,
        status: Option<u16>,
    },

    #[error("[CFG_001] invalid experiment {experiment}: {message}")]
    InvalidExperiment { experiment: String, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error.
    pub fn storage(code: StorageErrorCode, msg: impl Into<String>) -> Self {
        Self::Storage {
            code: code.code(),
            message: msg.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(code: TransportErrorCode, msg: impl Into<String>, status: Option<u16>) -> Self {
        Self::Transport {
            code: code.code(),
            message: msg.into(),
            status,
        }
    }

    pub fn invalid_experiment(experiment: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidExperiment {
            experiment: experiment.into(),
            message: msg.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error came from the network rather than from local state.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Storage { code, .. } => Some(code),
            Self::Transport { code, .. } => Some(code),
            Self::InvalidExperiment { .. } => Some("CFG_001"),
            _ => None,
        }
    }
}
