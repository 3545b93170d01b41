//! Error types for fleet dispatch.
//!
//! Errors are categorized so the caller can pick the right exit path:
//! validation problems are caught before any remote contact, dispatch
//! rejections are fatal for the invocation, and transport hiccups during
//! polling are retried on the next round.

use thiserror::Error;

/// Categories of fleet errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input; nothing was sent
    Validation,
    /// The fan-out request itself was rejected
    Dispatch,
    /// A single request/response exchange failed
    Transport,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether a poll round may simply try again next time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Validation => "Invalid request",
            Self::Dispatch => "Dispatch rejected",
            Self::Transport => "Remote call failed",
            Self::Other => "Unexpected error",
        }
    }
}

/// Request validation failures, raised before any remote contact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Group selector is not 1..6 or "all"
    #[error("{0}")]
    InvalidGroup(String),

    /// No targets were given
    #[error("target set is empty")]
    EmptyTargets,

    /// A target identifier is blank or malformed
    #[error("invalid target identifier: '{0}'")]
    InvalidTarget(String),

    /// Log level is not one of DEBUG, INFO, WARN, ERROR
    #[error("{0}")]
    InvalidLogLevel(String),

    /// Batch timeout must be positive
    #[error("timeout must be a positive number of seconds")]
    NonPositiveTimeout,

    /// Artifact source bucket is missing
    #[error("artifact bucket is required")]
    MissingArtifactSource,
}

/// Errors that can occur while dispatching or polling.
#[derive(Debug, Error)]
pub enum Error {
    /// Request validation failed
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The fan-out request was rejected by the transport
    #[error("dispatch rejected: {message}")]
    Dispatch {
        /// What was rejected
        message: String,
        /// Raw transport detail
        detail: String,
    },

    /// A request/response exchange failed
    #[error("transport error: {message}")]
    Transport {
        /// What failed
        message: String,
        /// Raw transport detail
        detail: String,
    },

    /// The transport answered with something we cannot interpret
    #[error("unexpected response: {0}")]
    Response(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation(_) => ErrorCategory::Validation,
            Error::Dispatch { .. } => ErrorCategory::Dispatch,
            Error::Transport { .. } | Error::Io(_) => ErrorCategory::Transport,
            Error::Response(_) | Error::Json(_) => ErrorCategory::Other,
        }
    }

    /// Raw transport detail, when there is any
    pub fn detail(&self) -> Option<&str> {
        match self {
            Error::Dispatch { detail, .. } | Error::Transport { detail, .. }
                if !detail.is_empty() =>
            {
                Some(detail.as_str())
            }
            _ => None,
        }
    }

    /// Re-label any failure of the fan-out call as a dispatch rejection.
    pub(crate) fn into_dispatch(self) -> Self {
        match self {
            Error::Dispatch { .. } | Error::Validation(_) => self,
            Error::Transport { message, detail } => Error::Dispatch { message, detail },
            other => Error::Dispatch {
                message: other.to_string(),
                detail: String::new(),
            },
        }
    }
}

/// Result type for fleet operations.
pub type Result<T> = std::result::Result<T, Error>;
