//! Error handling for the authentication gate

use std::fmt;
use thiserror::Error;

/// Failures reported by the identity & profile store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or answered with a server error
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the operation for the current credentials
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A record with the same key already exists
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// The call did not complete within the configured bound
    #[error("store call timed out")]
    Timeout,

    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed record
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Unified error type for the gate and its clients
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Access token could not be decoded
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Missing or malformed project settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Profile store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new authentication error
    pub fn auth<T: fmt::Display>(msg: T) -> Self {
        Error::Auth(msg.to_string())
    }
}

impl StoreError {
    /// Classify a non-success HTTP status returned by the store
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => StoreError::PermissionDenied(body),
            409 => StoreError::AlreadyExists(body),
            _ => StoreError::Unavailable(format!("status {}: {}", status, body)),
        }
    }
}
