//! Reporter error types.
//!
//! These stay inside the reporting pipeline. The public reporting calls turn
//! them into a [`ReportOutcome`](crate::ReportOutcome) and a log line.

use exception_outbox::OutboxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReporterError {
    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Building the event from an error failed.
    #[error("Format error: {0}")]
    Format(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Outbox setup failed (HTTP client or worker thread).
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    /// `configure` was called a second time.
    #[error("Exception reporter is already configured")]
    AlreadyConfigured,
}

pub type ReporterResult<T> = Result<T, ReporterError>;
