//! Error types for syncdub-client
//!
//! This module provides the error taxonomy for the task protocol:
//! - Local failures caught before any network call (validation, API misuse)
//! - Backend rejections and contract violations (submission, protocol)
//! - Non-fatal status read failures delivered to observers (transient poll)
//! - Terminal job failures reported by the backend (task)
//! - Machine-readable error codes for the UI layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for syncdub-client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for syncdub-client
#[derive(Debug, Error)]
pub enum Error {
    /// The request is incomplete or malformed; no network call was made
    #[error("invalid request: {message}")]
    Validation {
        /// Human-readable description of the problem
        message: String,
        /// The payload slot at fault, if the problem is slot-specific
        slot: Option<String>,
    },

    /// The backend rejected a submission
    #[error("submission rejected (HTTP {status}): {message}")]
    Submission {
        /// HTTP status code of the rejection
        status: u16,
        /// Backend-reported message, or one derived from the status
        message: String,
    },

    /// The backend response does not match the expected shape
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A single status read failed; polling continues on the next tick
    #[error("status read failed ({consecutive} in a row): {source}")]
    TransientPoll {
        /// Number of consecutive failed reads including this one
        consecutive: u32,
        /// The underlying failure
        source: Box<Error>,
    },

    /// The backend reported that the job itself failed
    #[error("task failed: {0}")]
    Task(#[from] TaskError),

    /// The API was used out of order (e.g. resolving a running task)
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "base_url")
        key: Option<String>,
    },

    /// A status read or submission returned a non-success HTTP status
    #[error("HTTP {status} from {endpoint}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Endpoint path that returned it
        endpoint: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL could not be built from the configured base
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The watch was cancelled before a terminal state was observed
    #[error("watch cancelled before the task finished")]
    Cancelled,

    /// A local file already exists and the collision action forbids replacing it
    #[error("file collision at {path}: {reason}")]
    FileCollision {
        /// The path where the collision occurred
        path: std::path::PathBuf,
        /// Why the collision could not be resolved
        reason: String,
    },
}

/// Terminal failure reported by the backend for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct TaskError {
    /// Human-readable failure message
    pub message: String,
    /// Optional machine-readable reason code supplied by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl TaskError {
    /// Message used when the backend reports failure without any text
    pub const GENERIC_MESSAGE: &'static str = "processing failed";

    /// Create a task error with just a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }
}

/// Coarse error category, stable for programmatic handling by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Incomplete request, rejected locally
    Validation,
    /// Backend refused the submission
    Submission,
    /// Backend response shape was wrong
    Protocol,
    /// One status read failed
    TransientPoll,
    /// The job failed on the backend
    Task,
    /// Client API misuse
    Precondition,
    /// Invalid client configuration
    Config,
    /// Transport-level failure (network, HTTP status, URL)
    Transport,
    /// Local I/O or (de)serialization failure
    Local,
    /// Watch cancelled by the caller
    Cancelled,
}

impl Error {
    /// Build a validation error that is not tied to a specific slot
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            slot: None,
        }
    }

    /// Build a configuration error for the given key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// The coarse category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Submission { .. } => ErrorKind::Submission,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::TransientPoll { .. } => ErrorKind::TransientPoll,
            Error::Task(_) => ErrorKind::Task,
            Error::Precondition(_) => ErrorKind::Precondition,
            Error::Config { .. } => ErrorKind::Config,
            Error::HttpStatus { .. } | Error::Network(_) | Error::InvalidUrl(_) => {
                ErrorKind::Transport
            }
            Error::Serialization(_) | Error::Io(_) | Error::FileCollision { .. } => {
                ErrorKind::Local
            }
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            Error::Validation { .. } => "validation_error",
            Error::Submission { .. } => "submission_error",
            Error::Protocol(_) => "protocol_error",
            Error::TransientPoll { .. } => "transient_poll_error",
            Error::Task(e) => e.code.as_deref().unwrap_or("task_error"),
            Error::Precondition(_) => "precondition_error",
            Error::Config { .. } => "config_error",
            Error::HttpStatus { .. } => "http_status_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Io(_) => "io_error",
            Error::InvalidUrl(_) => "invalid_url",
            Error::Cancelled => "cancelled",
            Error::FileCollision { .. } => "file_collision",
        }
    }
}

/// UI-facing rendering of an error
///
/// Carries enough structure for the presentation layer to decide whether to
/// offer a retry action without inspecting the error type.
///
/// # Example JSON
///
/// ```json
/// {
///   "code": "submission_error",
///   "message": "submission rejected (HTTP 400): No se seleccionaron archivos",
///   "retryable": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Whether offering the user a retry makes sense
    pub retryable: bool,
}

impl From<&Error> for ErrorDetail {
    fn from(error: &Error) -> Self {
        // Submission is never retried automatically, but the user may retry it
        let retryable = match error.kind() {
            ErrorKind::Submission | ErrorKind::Transport | ErrorKind::TransientPoll => true,
            ErrorKind::Task => true,
            _ => false,
        };

        ErrorDetail {
            code: error.error_code().to_string(),
            message: error.to_string(),
            retryable,
        }
    }
}
