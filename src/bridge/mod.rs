//! The `bridge` module wires broker topics to the device and back.
//!
//! It holds no protocol logic of its own: each command topic gets a consumer
//! task that decodes the body and submits a device command, and the device
//! pump forwards every response line to the response topic.

pub mod payload;

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker::{Ack, BrokerClient, Inbound, Subscription};
use crate::config::TopicSettings;
use crate::device::{
    DeviceLine, DeviceWriter, ResponseSink, SensorFanout, SensorState, pump_responses,
};
use crate::utils::BridgeError;
use crate::utils::shutdown::{self, ShutdownSignal};

pub use payload::{CommandPayload, MotorControl, SensorRequest, TurnOut};

const RESPONSE_CONTENT_TYPE: &str = "application/json";

/// Forwards device lines to a broker topic as `application/json` SEND frames.
pub struct ResponseTopic<T> {
    client: Arc<BrokerClient<T>>,
    destination: String,
}

impl<T> ResponseTopic<T> {
    pub fn new(client: Arc<BrokerClient<T>>, destination: impl Into<String>) -> Self {
        Self {
            client,
            destination: destination.into(),
        }
    }
}

impl<T> ResponseSink for ResponseTopic<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn forward(&self, line: &[u8]) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.client
            .send(&self.destination, line, RESPONSE_CONTENT_TYPE, None)
    }
}

pub struct Bridge<T> {
    client: Arc<BrokerClient<T>>,
    device: DeviceWriter,
    fanout: Arc<SensorFanout>,
    topics: TopicSettings,
}

impl<T> Bridge<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        client: Arc<BrokerClient<T>>,
        device: DeviceWriter,
        fanout: Arc<SensorFanout>,
        topics: TopicSettings,
    ) -> Self {
        Self {
            client,
            device,
            fanout,
            topics,
        }
    }

    /// Registers a listener for sensor reports from `address`.
    pub fn sensor_listener(&self, address: u8) -> mpsc::Receiver<SensorState> {
        self.fanout.register_listener(address)
    }

    /// Runs until `shutdown` fires or any loop ends, then tears the session down.
    ///
    /// Returns the error of the first loop that failed. A device or broker
    /// write failure ends the bridge; there is no reconnect.
    pub async fn run(
        self,
        inbound: Inbound<T>,
        device_lines: mpsc::Receiver<DeviceLine>,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), BridgeError> {
        self.client.connect().await?;

        let motor = self
            .client
            .subscribe(&self.topics.motor_control, Ack::Auto)
            .await?;
        let sensor = self.client.subscribe(&self.topics.sensor, Ack::Auto).await?;
        let turn_out = self
            .client
            .subscribe(&self.topics.turn_out, Ack::Auto)
            .await?;

        let (stop, stop_signal) = shutdown::channel();
        let mut tasks = JoinSet::new();
        tasks.spawn(consume::<MotorControl>(
            motor,
            self.device.clone(),
            stop_signal.clone(),
        ));
        tasks.spawn(consume::<SensorRequest>(
            sensor,
            self.device.clone(),
            stop_signal.clone(),
        ));
        tasks.spawn(consume::<TurnOut>(
            turn_out,
            self.device.clone(),
            stop_signal.clone(),
        ));

        {
            let client = self.client.clone();
            let signal = stop_signal.clone();
            tasks.spawn(async move {
                let stats = client.receive_loop(inbound, signal.clone()).await?;
                info!("Broker receive loop stopped: {stats:?}");
                if signal.is_triggered() {
                    Ok(())
                } else {
                    Err(BridgeError::BrokerClosed)
                }
            });
        }
        {
            let sink = ResponseTopic::new(self.client.clone(), self.topics.response.clone());
            let fanout = self.fanout.clone();
            let signal = stop_signal.clone();
            tasks.spawn(async move {
                let stats = pump_responses(device_lines, sink, fanout, signal).await?;
                info!("Device receive loop stopped: {stats:?}");
                Ok(())
            });
        }

        let outcome = tokio::select! {
            _ = shutdown.triggered() => {
                info!("Shutdown requested");
                Ok(())
            }
            Some(joined) = tasks.join_next() => match joined {
                Ok(result) => result,
                Err(e) => Err(BridgeError::Task(e.to_string())),
            },
        };

        stop.trigger();
        self.teardown().await;
        tasks.shutdown().await;
        outcome
    }

    async fn teardown(&self) {
        for id in self.client.subscriptions().ids().await {
            if let Err(e) = self.client.unsubscribe(id).await {
                warn!("Failed to unsubscribe {id}: {e}");
            }
        }
        if let Err(e) = self.client.disconnect(Uuid::new_v4()).await {
            warn!("Failed to disconnect from broker: {e}");
        }
    }
}

/// Consumer for one command topic. Undecodable bodies are skipped; a failed
/// device write ends the consumer with that error.
async fn consume<P: CommandPayload>(
    mut subscription: Subscription,
    device: DeviceWriter,
    mut shutdown: ShutdownSignal,
) -> Result<(), BridgeError> {
    loop {
        let frame = tokio::select! {
            _ = shutdown.triggered() => return Ok(()),
            frame = subscription.recv() => match frame {
                Some(frame) => frame,
                None => return Ok(()),
            },
        };

        let payload: P = match serde_json::from_slice(frame.body()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    "Could not process message body from {}: {e}",
                    subscription.destination()
                );
                continue;
            }
        };

        info!("{}", payload.describe());
        tokio::select! {
            _ = shutdown.triggered() => return Ok(()),
            submitted = device.submit(payload.command()) => submitted?,
        }
    }
}
