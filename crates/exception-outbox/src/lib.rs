//! # exception-outbox
//!
//! Asynchronous, best-effort delivery of exception events.
//!
//! ```text
//! ┌──────────────┐ push  ┌────────────────┐ drain ┌──────────────────┐ send ┌───────────┐
//! │  reporters   │──────▶│ DeliveryQueue  │──────▶│  DeliveryWorker  │─────▶│ Transport │
//! │ (any thread) │       │ (drop-oldest)  │       │ (own OS thread)  │      │  (HTTP)   │
//! └──────────────┘       └────────────────┘       └──────────────────┘      └───────────┘
//! ```
//!
//! - **[`DeliveryQueue`]**: bounded FIFO. A full queue evicts its oldest event
//!   so producers never block or fail.
//! - **[`DeliveryWorker`]**: drains up to `max_batch` events at a time and
//!   makes one send attempt per batch. Failures are logged and the batch is
//!   dropped; delivery is at most once.
//! - **[`Transport`]**: the network seam. [`HttpTransport`] posts JSON with a
//!   short timeout.
//!
//! ## Example
//!
//! ```ignore
//! use exception_outbox::{DeliveryQueue, DeliveryWorker, Event, HttpTransport, WorkerConfig};
//!
//! let queue = Arc::new(DeliveryQueue::new(10_000));
//! let transport = Arc::new(HttpTransport::new(sender_config)?);
//! let worker = DeliveryWorker::spawn(queue.clone(), transport, WorkerConfig::default())?;
//!
//! queue.push(Event::new(1, context_json, dimensions));
//! ```

mod error;
mod event;
mod queue;
mod sender;
mod worker;

pub use error::{OutboxError, OutboxResult};
pub use event::{BatchPayload, Event, PointPayload, SeriesPayload, EXCEPTIONS_SERIES};
pub use queue::{DeliveryQueue, DEFAULT_QUEUE_CAPACITY};
pub use sender::{HttpTransport, SenderConfig, Transport, DEFAULT_TIMEOUT};
pub use worker::{
    panic_message, DeliveryStats, DeliveryWorker, StatsSnapshot, WorkerConfig, DEFAULT_MAX_BATCH,
    DEFAULT_POLL_INTERVAL, WORKER_THREAD_NAME,
};
