//! Error types for the rewards API client.
//!
//! # Design
//! `ApiError` is the tagged view of a failed `ApiResponse`. `Unauthorized`
//! gets its own variant because a 401 also evicts the resident token and the
//! UI reacts by routing to login. Everything else is split by who is at
//! fault: the network, the request, the server, or the client itself.

use thiserror::Error;

use crate::response::ErrorItem;

/// Failure side of `ApiResponse::into_result`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// No response reached the client (DNS, connect, timeout). Status 0.
    #[error("network error: {detail}")]
    Network { detail: String },

    /// The server answered 401; the resident token has been evicted.
    #[error("unauthorized: {}", summarize(.errors))]
    Unauthorized { errors: Vec<ErrorItem> },

    /// The server rejected the request with a 4xx other than 401.
    #[error("request rejected with status {status}: {}", summarize(.errors))]
    Client { status: u16, errors: Vec<ErrorItem> },

    /// The server answered 5xx.
    #[error("server error {status}: {}", summarize(.errors))]
    Server { status: u16, errors: Vec<ErrorItem> },

    /// Something failed inside the client (serialization, decoding,
    /// transport setup). Surfaced with status 500.
    #[error("unexpected error: {detail}")]
    Unexpected { detail: String },

    /// A success response that did not carry the `data` the caller needed.
    #[error("response with status {status} carried no data")]
    MissingData { status: u16 },
}

impl ApiError {
    /// Status code this error is reported under in an `ApiResponse`.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Network { .. } => 0,
            ApiError::Unauthorized { .. } => 401,
            ApiError::Client { status, .. } | ApiError::Server { status, .. } => *status,
            ApiError::Unexpected { .. } => 500,
            ApiError::MissingData { status } => *status,
        }
    }

    /// First human-readable message, for toast-style display.
    pub fn message(&self) -> String {
        match self {
            ApiError::Unauthorized { errors }
            | ApiError::Client { errors, .. }
            | ApiError::Server { errors, .. } => summarize(errors),
            ApiError::Network { detail } | ApiError::Unexpected { detail } => detail.clone(),
            ApiError::MissingData { .. } => self.to_string(),
        }
    }
}

fn summarize(errors: &[ErrorItem]) -> String {
    errors
        .first()
        .and_then(|e| e.detail.as_deref().or(e.title.as_deref()))
        .unwrap_or("no details")
        .to_string()
}

/// Failure of the secure token storage facility.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The platform storage API is missing or refused the operation.
    #[error("secure storage unavailable: {0}")]
    Unavailable(String),

    #[error("token storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a `Transport` before any HTTP response was read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No reply at all: resolution, connection or timeout failure.
    #[error("no response: {0}")]
    NoResponse(String),

    /// Anything else the transport could not handle.
    #[error("transport failure: {0}")]
    Other(String),
}
