//! Background delivery worker.
//!
//! One worker thread per queue. It parks on the queue until events arrive or
//! the poll interval passes, drains up to `max_batch` events, and makes a
//! single send attempt. Failed batches are logged and dropped; they are never
//! put back on the queue.

use crate::{BatchPayload, DeliveryQueue, Event, OutboxError, OutboxResult, Transport};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "exception-delivery-worker";

/// Default maximum events per transmission.
pub const DEFAULT_MAX_BATCH: usize = 200;

/// Default wait between polls of an empty queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Worker batching and polling behavior.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of events per transmission.
    pub max_batch: usize,
    /// How long to park on an empty queue before polling again.
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_batch: DEFAULT_MAX_BATCH,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Delivery counters, updated by the worker thread.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered_batches: AtomicU64,
    delivered_events: AtomicU64,
    failed_batches: AtomicU64,
    failed_events: AtomicU64,
}

/// Point-in-time copy of [`DeliveryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub delivered_batches: u64,
    pub delivered_events: u64,
    pub failed_batches: u64,
    pub failed_events: u64,
}

impl DeliveryStats {
    fn record_delivered(&self, events: usize) {
        self.delivered_batches.fetch_add(1, Ordering::Relaxed);
        self.delivered_events.fetch_add(events as u64, Ordering::Relaxed);
    }

    fn record_failed(&self, events: usize) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.failed_events.fetch_add(events as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered_batches: self.delivered_batches.load(Ordering::Relaxed),
            delivered_events: self.delivered_events.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            failed_events: self.failed_events.load(Ordering::Relaxed),
        }
    }
}

/// Handle to the running worker thread.
///
/// Dropping the handle stops the worker after a final flush.
pub struct DeliveryWorker {
    queue: Arc<DeliveryQueue>,
    stop: Arc<AtomicBool>,
    stats: Arc<DeliveryStats>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryWorker {
    /// Spawn the worker thread draining `queue` into `transport`.
    pub fn spawn(
        queue: Arc<DeliveryQueue>,
        transport: Arc<dyn Transport>,
        config: WorkerConfig,
    ) -> OutboxResult<Self> {
        let config = WorkerConfig {
            max_batch: config.max_batch.max(1),
            poll_interval: config.poll_interval,
        };
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(DeliveryStats::default());

        let handle = {
            let queue = queue.clone();
            let stop = stop.clone();
            let stats = stats.clone();
            std::thread::Builder::new()
                .name(WORKER_THREAD_NAME.to_string())
                .spawn(move || run_worker_loop(&queue, &*transport, &config, &stop, &stats))
                .map_err(|e| OutboxError::Worker(e.to_string()))?
        };

        debug!("Delivery worker started");

        Ok(Self {
            queue,
            stop,
            stats,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the worker and wait for its final flush. Idempotent.
    pub fn shutdown(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };

        self.stop.store(true, Ordering::Release);
        self.queue.wake();

        if handle.join().is_err() {
            error!("Delivery worker thread panicked");
        }
        let stats = self.stats.snapshot();
        info!(
            delivered_events = stats.delivered_events,
            failed_events = stats.failed_events,
            dropped_events = self.queue.dropped(),
            "Delivery worker stopped"
        );
    }
}

impl Drop for DeliveryWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker_loop(
    queue: &DeliveryQueue,
    transport: &dyn Transport,
    config: &WorkerConfig,
    stop: &AtomicBool,
    stats: &DeliveryStats,
) {
    while !stop.load(Ordering::Acquire) {
        let batch = queue.drain(config.max_batch);
        if batch.is_empty() {
            queue.wait_for_events(config.poll_interval, stop);
            continue;
        }
        deliver_batch(batch, transport, stats);
    }

    // Best-effort flush of whatever is still queued.
    loop {
        let batch = queue.drain(config.max_batch);
        if batch.is_empty() {
            break;
        }
        deliver_batch(batch, transport, stats);
    }
}

fn deliver_batch(batch: Vec<Event>, transport: &dyn Transport, stats: &DeliveryStats) {
    let batch_id = Uuid::new_v4();
    let count = batch.len();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let payload = BatchPayload::from_events(&batch);
        transport.send(&payload)
    }));

    match outcome {
        Ok(Ok(())) => {
            stats.record_delivered(count);
            debug!(batch_id = %batch_id, events = count, "Batch delivered");
        }
        Ok(Err(err)) => {
            stats.record_failed(count);
            warn!(batch_id = %batch_id, events = count, error = %err, "Batch delivery failed, dropping");
        }
        Err(payload) => {
            stats.record_failed(count);
            error!(
                batch_id = %batch_id,
                events = count,
                panic = panic_message(payload.as_ref()),
                "Batch delivery panicked, dropping"
            );
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "Box<dyn Any>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Instant;

    /// Records every payload it is handed; fails when told to.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<BatchPayload>>,
        fail: AtomicBool,
    }

    impl Transport for RecordingTransport {
        fn send(&self, payload: &BatchPayload) -> OutboxResult<()> {
            self.sent.lock().push(payload.clone());
            if self.fail.load(Ordering::SeqCst) {
                return Err(OutboxError::Endpoint {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(())
        }
    }

    fn event(label: &str) -> Event {
        Event::new(1, label.to_string(), BTreeMap::new())
    }

    fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn fast_config(max_batch: usize) -> WorkerConfig {
        WorkerConfig {
            max_batch,
            poll_interval: Duration::from_millis(20),
        }
    }

    #[test]
    fn default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_batch, 200);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn delivers_queued_events_in_bounded_batches() {
        let queue = Arc::new(DeliveryQueue::new(100));
        for i in 0..5 {
            queue.push(event(&i.to_string()));
        }
        let transport = Arc::new(RecordingTransport::default());
        let worker = DeliveryWorker::spawn(queue.clone(), transport.clone(), fast_config(2)).unwrap();

        assert!(wait_until(Duration::from_secs(5), || {
            worker.stats().delivered_events == 5
        }));
        worker.shutdown();

        let sent = transport.sent.lock();
        assert!(sent.iter().all(|p| p.point_count() <= 2));
        let contexts: Vec<String> = sent
            .iter()
            .flat_map(|p| p.series.iter().flat_map(|s| s.points.iter()))
            .map(|point| point.context.clone())
            .collect();
        assert_eq!(contexts, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn failed_batches_are_dropped_and_worker_keeps_going() {
        let queue = Arc::new(DeliveryQueue::new(100));
        let transport = Arc::new(RecordingTransport::default());
        transport.fail.store(true, Ordering::SeqCst);
        let worker = DeliveryWorker::spawn(queue.clone(), transport.clone(), fast_config(10)).unwrap();

        queue.push(event("lost"));
        assert!(wait_until(Duration::from_secs(5), || worker.stats().failed_batches == 1));
        assert!(queue.is_empty());

        transport.fail.store(false, Ordering::SeqCst);
        queue.push(event("kept"));
        assert!(wait_until(Duration::from_secs(5), || {
            worker.stats().delivered_batches == 1
        }));
        assert!(worker.is_running());

        // The failed event was attempted once and never re-sent.
        let attempts = transport
            .sent
            .lock()
            .iter()
            .filter(|p| p.series[0].points[0].context == "lost")
            .count();
        assert_eq!(attempts, 1);
    }

    #[test]
    fn panicking_transport_does_not_kill_worker() {
        struct FlakyTransport {
            calls: AtomicU64,
        }
        impl Transport for FlakyTransport {
            fn send(&self, _payload: &BatchPayload) -> OutboxResult<()> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("serializer exploded");
                }
                Ok(())
            }
        }

        let queue = Arc::new(DeliveryQueue::new(100));
        let transport = Arc::new(FlakyTransport {
            calls: AtomicU64::new(0),
        });
        let worker = DeliveryWorker::spawn(queue.clone(), transport, fast_config(10)).unwrap();

        queue.push(event("first"));
        assert!(wait_until(Duration::from_secs(5), || worker.stats().failed_batches == 1));
        queue.push(event("second"));
        assert!(wait_until(Duration::from_secs(5), || {
            worker.stats().delivered_batches == 1
        }));
        assert!(worker.is_running());
    }

    #[test]
    fn shutdown_flushes_pending_events() {
        let queue = Arc::new(DeliveryQueue::new(100));
        let transport = Arc::new(RecordingTransport::default());
        let config = WorkerConfig {
            max_batch: 3,
            poll_interval: Duration::from_secs(60),
        };
        let worker = DeliveryWorker::spawn(queue.clone(), transport.clone(), config).unwrap();

        for i in 0..7 {
            queue.push(event(&i.to_string()));
        }
        worker.shutdown();

        assert!(!worker.is_running());
        assert!(queue.is_empty());
        assert_eq!(worker.stats().delivered_events, 7);
        worker.shutdown();
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "Box<dyn Any>");
    }
}
