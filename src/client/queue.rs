//! # Outbound Queue
//!
//! Bounded FIFO between the producer and the sender task. The producer side
//! never blocks: when the queue is full the oldest pending value is evicted to
//! make room, so the freshest reading always wins over a stale backlog.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::common::value::{Producer, Value};

/// Default number of values held before eviction starts.
pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<Value>,
    closed: bool,
    evicted: u64,
}

/// Thread-safe bounded buffer with drop-oldest backpressure.
#[derive(Debug)]
pub struct OutboundQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                ..QueueState::default()
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // The state stays consistent even if a holder panicked mid-push.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a value, evicting the oldest one when full. Never blocks.
    ///
    /// Values pushed after [`close`](Self::close) are discarded.
    pub fn push(&self, value: Value) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            if state.items.len() >= self.capacity {
                state.items.pop_front();
                state.evicted += 1;
            }
            state.items.push_back(value);
        }
        self.notify.notify_one();
    }

    /// Wait for the next value.
    ///
    /// Returns `None` only once the queue is closed and empty. Cancel-safe: a
    /// value is removed only when this future completes.
    pub async fn pop(&self) -> Option<Value> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(value) = state.items.pop_front() {
                    return Some(value);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    pub fn try_pop(&self) -> Option<Value> {
        self.lock().items.pop_front()
    }

    /// Stop accepting values and wake every waiter.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of values discarded by drop-oldest eviction so far.
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Producer for OutboundQueue {
    fn submit(&self, value: i64) {
        self.push(Value::clamped(value));
    }
}
