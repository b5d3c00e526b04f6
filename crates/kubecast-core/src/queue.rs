//! Bounded outbound queue
//!
//! Single-producer (hub) / single-consumer (session drain loop) FIFO. The
//! producer side never waits: a full queue is reported back so the hub can
//! apply its overflow policy. The consumer side is async.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Why an item was not enqueued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushError<T> {
    /// Queue is at capacity
    Full(T),
    /// Queue was closed
    Closed(T),
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded FIFO shared between the hub and one session.
#[derive(Debug)]
pub struct OutboundQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    capacity: usize,
}

impl<T> OutboundQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue without waiting.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(PushError::Closed(item));
            }
            if state.items.len() >= self.capacity {
                return Err(PushError::Full(item));
            }
            state.items.push_back(item);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Enqueue, discarding the oldest item when full.
    ///
    /// Returns the discarded item, if any.
    pub fn push_drop_oldest(&self, item: T) -> Result<Option<T>, PushError<T>> {
        let dropped = {
            let mut state = self.lock();
            if state.closed {
                return Err(PushError::Closed(item));
            }
            let dropped = if state.items.len() >= self.capacity {
                state.items.pop_front()
            } else {
                None
            };
            state.items.push_back(item);
            dropped
        };
        self.notify.notify_one();
        Ok(dropped)
    }

    /// Wait for the next item.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Stop accepting items. Queued items can still be popped.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    /// Whether `close` has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Items currently queued
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
