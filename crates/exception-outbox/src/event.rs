//! Queued events and the wire payload built from a batch of them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Series name used for exception occurrences.
pub const EXCEPTIONS_SERIES: &str = "exceptions";

/// One reportable occurrence, ready for transmission.
///
/// An event is moved into the queue by value and handed to exactly one
/// batch; nothing mutates it after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Series the point is written to.
    pub series: String,
    /// Point value (`1` per exception occurrence).
    pub value: i64,
    /// Serialized JSON context.
    pub context: String,
    /// Indexed dimensions (error class, server, ...).
    pub dimensions: BTreeMap<String, String>,
    /// When the event was created.
    pub enqueued_at: DateTime<Utc>,
}

impl Event {
    /// Create an event in the exceptions series, stamped now.
    pub fn new(value: i64, context: String, dimensions: BTreeMap<String, String>) -> Self {
        Self {
            series: EXCEPTIONS_SERIES.to_string(),
            value,
            context,
            dimensions,
            enqueued_at: Utc::now(),
        }
    }

    /// Write the event to a different series.
    pub fn with_series(mut self, series: impl Into<String>) -> Self {
        self.series = series.into();
        self
    }
}

/// A single point in the wire payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointPayload {
    #[serde(rename = "v")]
    pub value: i64,
    #[serde(rename = "c")]
    pub context: String,
    #[serde(rename = "d")]
    pub dimensions: BTreeMap<String, String>,
    /// Unix seconds.
    #[serde(rename = "t")]
    pub timestamp: i64,
}

/// All points of one series in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPayload {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "p")]
    pub points: Vec<PointPayload>,
}

/// The body of one transmission: a list of series, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BatchPayload {
    pub series: Vec<SeriesPayload>,
}

impl BatchPayload {
    /// Group a drained batch by series, keeping event order inside each series.
    pub fn from_events(events: &[Event]) -> Self {
        let mut series: Vec<SeriesPayload> = Vec::new();
        for event in events {
            let point = PointPayload {
                value: event.value,
                context: event.context.clone(),
                dimensions: event.dimensions.clone(),
                timestamp: event.enqueued_at.timestamp(),
            };
            match series.iter_mut().find(|s| s.name == event.series) {
                Some(existing) => existing.points.push(point),
                None => series.push(SeriesPayload {
                    name: event.series.clone(),
                    points: vec![point],
                }),
            }
        }
        Self { series }
    }

    /// Total number of points across all series.
    pub fn point_count(&self) -> usize {
        self.series.iter().map(|s| s.points.len()).sum()
    }
}
