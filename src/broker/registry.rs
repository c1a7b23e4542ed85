use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::transport::Frame;
use crate::utils::BridgeError;
use crate::utils::queue::{Offer, QueuePolicy};

/// Outcome of routing one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Delivered,
    /// No registration under that id; the frame is discarded.
    NoSubscriber,
    /// The subscriber's queue refused the frame.
    Dropped(Offer),
}

#[derive(Debug)]
struct Entry {
    destination: String,
    sender: mpsc::Sender<Frame>,
}

/// Maps subscription ids to delivery queues.
///
/// Dispatch holds the shared lock for the whole send, so `unregister` cannot
/// close a queue while a frame is being offered to it.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<Uuid, Entry>>,
    policy: QueuePolicy,
}

impl SubscriptionRegistry {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub async fn register(&self, destination: &str) -> (Uuid, mpsc::Receiver<Frame>) {
        let id = Uuid::new_v4();
        let (sender, receiver) = self.policy.channel();
        self.entries.write().await.insert(
            id,
            Entry {
                destination: destination.to_string(),
                sender,
            },
        );
        debug!("Registered subscription {id} for {destination}");
        (id, receiver)
    }

    /// Routes `frame` to the registration named by a `subscription` header value.
    pub async fn dispatch(&self, subscription: &str, frame: Frame) -> Result<Dispatch, BridgeError> {
        let id = Uuid::parse_str(subscription).map_err(|source| {
            BridgeError::InvalidSubscriptionId {
                value: subscription.to_string(),
                source,
            }
        })?;

        let entries = self.entries.read().await;
        let Some(entry) = entries.get(&id) else {
            return Ok(Dispatch::NoSubscriber);
        };

        match self.policy.offer(&entry.sender, frame).await {
            Offer::Delivered => Ok(Dispatch::Delivered),
            refused => {
                warn!(
                    "Dropped frame for subscription {id} ({}): {refused:?}",
                    entry.destination
                );
                Ok(Dispatch::Dropped(refused))
            }
        }
    }

    /// Removes a registration and closes its queue. Returns false if it was unknown.
    pub async fn unregister(&self, id: Uuid) -> bool {
        let removed = self.entries.write().await.remove(&id);
        if let Some(entry) = &removed {
            debug!("Unregistered subscription {id} for {}", entry.destination);
        }
        removed.is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<Uuid> {
        self.entries.read().await.keys().copied().collect()
    }
}
