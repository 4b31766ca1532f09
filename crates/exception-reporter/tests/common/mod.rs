#![allow(dead_code)]

use exception_outbox::{BatchPayload, OutboxError, OutboxResult, Transport};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Transport that records payloads and can be told to fail.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<BatchPayload>>,
    pub fail: AtomicBool,
}

impl RecordingTransport {
    /// `(class, message)` of every delivered point, in order.
    pub fn points(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .iter()
            .flat_map(|p| p.series.iter().flat_map(|s| s.points.iter()))
            .map(|point| {
                let context: serde_json::Value = serde_json::from_str(&point.context).unwrap();
                (
                    point.dimensions["class"].clone(),
                    context["message"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    /// Parsed context of every delivered point, in order.
    pub fn contexts(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .flat_map(|p| p.series.iter().flat_map(|s| s.points.iter()))
            .map(|point| serde_json::from_str(&point.context).unwrap())
            .collect()
    }

    pub fn batches(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, payload: &BatchPayload) -> OutboxResult<()> {
        self.sent.lock().push(payload.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(OutboxError::Endpoint {
                status: 500,
                message: "down".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct AppError(pub String);

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for AppError {}

#[derive(Debug)]
pub struct TimeoutError;

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("execution expired")
    }
}

impl std::error::Error for TimeoutError {}

pub fn boom() -> AppError {
    AppError("boom".to_string())
}
