use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::device::response::SensorState;
use crate::utils::queue::{Offer, QueuePolicy};

/// Broadcasts sensor states to the listeners registered for each address.
///
/// Listeners for one address are served in registration order, one at a
/// time. Registering twice yields two queues and two deliveries.
#[derive(Debug)]
pub struct SensorFanout {
    listeners: Mutex<HashMap<u8, Vec<mpsc::Sender<SensorState>>>>,
    policy: QueuePolicy,
}

impl SensorFanout {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn register_listener(&self, address: u8) -> mpsc::Receiver<SensorState> {
        let (sender, receiver) = self.policy.channel();
        self.lock().entry(address).or_default().push(sender);
        debug!("Added listener for sensor {address:#04x}");
        receiver
    }

    pub fn listener_count(&self, address: u8) -> usize {
        self.lock().get(&address).map_or(0, Vec::len)
    }

    /// Sends a copy of `state` to each listener for its address and returns
    /// how many accepted it. Listeners whose receiver is gone are pruned.
    pub async fn deliver(&self, state: &SensorState) -> usize {
        let targets = match self.lock().get(&state.address) {
            Some(list) => list.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut saw_closed = false;
        for sender in &targets {
            match self.policy.offer(sender, state.clone()).await {
                Offer::Delivered => delivered += 1,
                Offer::Closed => saw_closed = true,
                refused => warn!(
                    "Sensor {:#04x} listener missed a state: {refused:?}",
                    state.address
                ),
            }
        }

        if saw_closed {
            let mut listeners = self.lock();
            if let Some(list) = listeners.get_mut(&state.address) {
                list.retain(|sender| !sender.is_closed());
                if list.is_empty() {
                    listeners.remove(&state.address);
                }
            }
        }
        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u8, Vec<mpsc::Sender<SensorState>>>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}
