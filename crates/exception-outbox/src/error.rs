//! Outbox error types.

use thiserror::Error;

/// Errors raised while delivering a batch.
///
/// None of these ever reach the code that pushed the events; the worker logs
/// them and drops the batch.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Network or transport-level HTTP error (connect failure, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("Endpoint error: {status} - {message}")]
    Endpoint {
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Response body, kept for diagnostics.
        message: String,
    },

    /// Payload serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The background worker could not be started.
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
