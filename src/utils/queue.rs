//! Bounded delivery queues.
//!
//! Every subscriber and sensor listener receives through a bounded
//! `mpsc` channel. `QueuePolicy` fixes its capacity and what a producer does
//! when the consumer falls behind.

use std::time::Duration;

use tokio::sync::mpsc;

/// What a producer does when a consumer's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Wait until the consumer makes room.
    Block,
    /// Discard the item being offered.
    DropNewest,
    /// Wait up to the given duration, then discard the item.
    BlockWithTimeout(Duration),
}

/// Result of offering one item to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Delivered,
    Full,
    TimedOut,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    pub capacity: usize,
    pub overflow: Overflow,
}

impl QueuePolicy {
    pub fn new(capacity: usize, overflow: Overflow) -> Self {
        Self {
            capacity: capacity.max(1),
            overflow,
        }
    }

    /// Creates a channel sized for this policy.
    pub fn channel<T>(&self) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
        mpsc::channel(self.capacity.max(1))
    }

    /// Offers `item` to `sender`, applying the overflow policy.
    pub async fn offer<T: Send>(&self, sender: &mpsc::Sender<T>, item: T) -> Offer {
        match self.overflow {
            Overflow::Block => match sender.send(item).await {
                Ok(()) => Offer::Delivered,
                Err(_) => Offer::Closed,
            },
            Overflow::DropNewest => match sender.try_send(item) {
                Ok(()) => Offer::Delivered,
                Err(mpsc::error::TrySendError::Full(_)) => Offer::Full,
                Err(mpsc::error::TrySendError::Closed(_)) => Offer::Closed,
            },
            Overflow::BlockWithTimeout(limit) => {
                match tokio::time::timeout(limit, sender.send(item)).await {
                    Ok(Ok(())) => Offer::Delivered,
                    Ok(Err(_)) => Offer::Closed,
                    Err(_) => Offer::TimedOut,
                }
            }
        }
    }
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self::new(16, Overflow::BlockWithTimeout(Duration::from_secs(1)))
    }
}
