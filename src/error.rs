use std::fmt;
use std::io;
use thiserror::Error;

use crate::task::{Exception, OperationKind};
use crate::transport::ApiResponse;

/// Error type for every operation against the Ceph manager API.
///
/// Variants follow the lifecycle of a tracked mutation: input validation,
/// the HTTP exchange itself, backend-reported conflicts, and the outcome of
/// the server-side task.
#[derive(Debug, Error)]
pub enum CephError {
    /// A required parameter was empty. Never retried.
    #[error("param {field} can not be empty")]
    Validation { field: &'static str },

    /// Connection, timeout or body transfer failure.
    #[error("HTTP request error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a status the caller can not proceed with.
    #[error("{context}: HTTP {status}: {message}")]
    Api {
        context: String,
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The image to be created (or the rename target) already exists.
    #[error("RBD image already exists (error {} image): {detail}", .operation.gerund())]
    AlreadyExists {
        operation: OperationKind,
        detail: String,
    },

    /// The task kept failing until the retry budget ran out.
    #[error("max recursive iterations exceeded for {operation} after {attempts} attempts (limit {max_iterations}){}", LastFailure(.last_failure))]
    RetryBudgetExceeded {
        operation: String,
        max_iterations: u32,
        attempts: u32,
        last_failure: Option<String>,
    },

    /// The task left the executing list but never showed up as finished.
    #[error("outcome of {operation} is unknown: no finished task after {polls} polls")]
    OperationIndeterminate { operation: String, polls: u32 },

    #[error("image {image_spec} not found")]
    NotFound { image_spec: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

struct LastFailure<'a>(&'a Option<String>);

impl fmt::Display for LastFailure<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(failure) => write!(f, ": last failure: {}", failure),
            None => Ok(()),
        }
    }
}

impl CephError {
    /// Build an `Api` error from a response, preferring the backend's
    /// exception `detail`/`code` over the raw body.
    pub fn from_response(context: impl Into<String>, response: &ApiResponse) -> Self {
        let (code, message) = match response.exception() {
            Some(Exception { code, detail, .. }) if !detail.is_empty() => (code, detail),
            _ => (None, response.body.clone()),
        };
        CephError::Api {
            context: context.into(),
            status: response.status,
            code,
            message,
        }
    }

    /// Transport failures worth repeating within the transport retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            CephError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            CephError::Api { status, .. } => Some(*status),
            CephError::Transport(e) => e.status().map(|s| s.as_u16()),
            CephError::NotFound { .. } => Some(404),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CephError {
    fn from(error: serde_json::Error) -> Self {
        CephError::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for CephError {
    fn from(error: toml::de::Error) -> Self {
        CephError::Configuration(error.to_string())
    }
}

/// Result type alias for operations that can result in a CephError
pub type CephResult<T> = Result<T, CephError>;
