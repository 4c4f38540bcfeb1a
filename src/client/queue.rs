use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};

/// Unbounded FIFO of delivered payloads shared between the delivery listener
/// and the consumption APIs of one client.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    items: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: Vec<u8>) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
        self.notify.notify_one();
    }

    pub fn try_pop(&self) -> Option<Vec<u8>> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Waits for the next item.
    ///
    /// `None` waits forever, a zero limit only polls, any other limit gives
    /// up after that long.
    pub async fn pop_wait(&self, limit: Option<Duration>) -> Option<Vec<u8>> {
        if limit == Some(Duration::ZERO) {
            return self.try_pop();
        }
        let deadline = limit.map(|limit| Instant::now() + limit);

        loop {
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            // notify_one keeps a permit when nobody waits, so a push racing
            // this point is not lost
            let notified = self.notify.notified();
            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if timeout_at(deadline, notified).await.is_err() {
                        return self.try_pop();
                    }
                }
            }
        }
    }

    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
