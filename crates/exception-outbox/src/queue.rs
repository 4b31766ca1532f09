//! Bounded in-memory queue between reporters and the delivery worker.

use crate::Event;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default number of events held before the oldest is evicted.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Bounded FIFO of pending events with a drop-oldest overflow policy.
///
/// Producers call [`push`](Self::push) from any thread; a single consumer
/// calls [`drain`](Self::drain). Both take the same lock, so an event is
/// returned by at most one drain.
pub struct DeliveryQueue {
    pending: Mutex<VecDeque<Event>>,
    /// Signalled when an event lands in an empty queue, or on shutdown.
    available: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl DeliveryQueue {
    /// Create a queue holding at most `capacity` events (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            available: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append an event, evicting the oldest one if the queue is full.
    pub fn push(&self, event: Event) {
        let was_empty = {
            let mut pending = self.pending.lock();
            let was_empty = pending.is_empty();
            if pending.len() >= self.capacity {
                pending.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(capacity = self.capacity, dropped, "Queue full, evicted oldest event");
            }
            pending.push_back(event);
            was_empty
        };

        if was_empty {
            self.available.notify_one();
        }
    }

    /// Remove and return up to `max_batch` events, oldest first.
    ///
    /// Never blocks; an empty queue yields an empty batch.
    pub fn drain(&self, max_batch: usize) -> Vec<Event> {
        let mut pending = self.pending.lock();
        let count = pending.len().min(max_batch);
        pending.drain(..count).collect()
    }

    /// Current number of queued events.
    pub fn size(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events evicted by overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Park until an event is queued, `stop` is set, or `timeout` elapses.
    ///
    /// Returns true if events are waiting when the call returns.
    pub fn wait_for_events(&self, timeout: Duration, stop: &AtomicBool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self.pending.lock();
        while pending.is_empty() && !stop.load(Ordering::Acquire) {
            if self.available.wait_until(&mut pending, deadline).timed_out() {
                break;
            }
        }
        !pending.is_empty()
    }

    /// Wake a parked consumer so it can re-check its stop flag.
    pub fn wake(&self) {
        // Taking the lock orders this notify after any in-progress stop check.
        let _pending = self.pending.lock();
        self.available.notify_all();
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
