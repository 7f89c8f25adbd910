//! Error taxonomy for the client.
//!
//! # Design
//! `NetworkError` is a closed set: every failing call yields exactly one
//! variant. 401, 403 and 404 get dedicated variants because callers branch on
//! them; every other 4xx lands in `ClientError` and everything else that is
//! not 2xx lands in `ServerError`. Retry policy is left to the caller;
//! `is_retryable` only classifies.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors returned by `Client` operations.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The base URL and path did not form a valid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The transport produced something that is not an HTTP response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("unauthorized (401)")]
    Unauthorized,

    #[error("forbidden (403)")]
    Forbidden,

    #[error("not found (404)")]
    NotFound,

    /// Any other 4xx status.
    #[error("client error ({status})")]
    ClientError { status: u16 },

    /// 5xx, or any status outside the ranges above.
    #[error("server error ({status})")]
    ServerError { status: u16 },

    /// The response body could not be decoded into the expected type.
    #[error("decoding failed: {0}")]
    Decoding(String),

    /// The request body or query could not be encoded.
    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("unknown error")]
    Unknown,
}

impl NetworkError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, NetworkError::ServerError { .. } | NetworkError::Transport(_))
    }

    /// The HTTP status this error was classified from, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkError::Unauthorized => Some(401),
            NetworkError::Forbidden => Some(403),
            NetworkError::NotFound => Some(404),
            NetworkError::ClientError { status } | NetworkError::ServerError { status } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub(crate) fn cancelled() -> Self {
        NetworkError::Transport(TransportError::new(
            TransportErrorKind::Cancelled,
            "operation cancelled",
        ))
    }
}

/// Broad cause of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Cancelled,
    Io,
    Other,
}

/// Failure reported by a transport session before any HTTP status was seen.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::ConnectionReset => {
                TransportErrorKind::Connect
            }
            _ => TransportErrorKind::Io,
        };
        TransportError::new(kind, err.to_string())
    }
}

/// Map an HTTP status code to success or the matching error variant.
pub fn classify(status: u16) -> Result<()> {
    match status {
        200..=299 => Ok(()),
        401 => Err(NetworkError::Unauthorized),
        403 => Err(NetworkError::Forbidden),
        404 => Err(NetworkError::NotFound),
        400..=499 => Err(NetworkError::ClientError { status }),
        _ => Err(NetworkError::ServerError { status }),
    }
}

/// Reject values that cannot be an HTTP status, then classify.
pub(crate) fn validate_status(status: u16) -> Result<()> {
    if !(100..=999).contains(&status) {
        return Err(NetworkError::InvalidResponse(format!(
            "status {status} is not an HTTP status code"
        )));
    }
    classify(status)
}
