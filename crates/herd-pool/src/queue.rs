//! Blocking idle-worker queue.
//!
//! A FIFO of idle workers paired with a counting semaphore: every entry
//! in the deque is backed by one permit, so a caller that obtains a permit
//! is guaranteed an entry. Waiters park on the semaphore instead of
//! polling, and closing the semaphore wakes all of them at once.
//!
//! Ordering is best-effort FIFO. Tokio's semaphore is fair, but the
//! pop that follows a permit is not tied to a particular entry.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::Semaphore;

use crate::worker::Worker;

/// The queue was closed while (or before) waiting for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("idle queue closed")]
pub struct QueueClosed;

pub struct IdleQueue {
    entries: Mutex<VecDeque<Arc<Worker>>>,
    available: Semaphore,
}

impl IdleQueue {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            available: Semaphore::new(0),
        }
    }

    /// Publish a worker and wake one waiter.
    pub fn push(&self, worker: Arc<Worker>) {
        self.entries.lock().expect("idle queue lock").push_back(worker);
        self.available.add_permits(1);
    }

    /// Take the head entry, waiting until one is published.
    ///
    /// Cancel safe: dropping the future before it resolves leaves the
    /// queue untouched.
    pub async fn pop(&self) -> Result<Arc<Worker>, QueueClosed> {
        loop {
            let permit = self.available.acquire().await.map_err(|_| QueueClosed)?;
            permit.forget();
            // Entries only go missing without a matching permit when the
            // queue was drained during close; the next acquire reports it.
            if let Some(worker) = self.entries.lock().expect("idle queue lock").pop_front() {
                return Ok(worker);
            }
        }
    }

    /// Take the head entry if one is available right now.
    #[cfg(test)]
    pub(crate) fn try_pop(&self) -> Option<Arc<Worker>> {
        let permit = self.available.try_acquire().ok()?;
        permit.forget();
        self.entries.lock().expect("idle queue lock").pop_front()
    }

    /// Remove every entry without consuming permits.
    pub fn drain(&self) -> Vec<Arc<Worker>> {
        self.entries.lock().expect("idle queue lock").drain(..).collect()
    }

    /// Refuse further pops and wake every waiter with `QueueClosed`.
    pub fn close(&self) {
        self.available.close();
    }

    pub fn is_closed(&self) -> bool {
        self.available.is_closed()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("idle queue lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IdleQueue {
    fn default() -> Self {
        Self::new()
    }
}
