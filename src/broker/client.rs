//! Broker client
//!
//! `BrokerClient` owns the websocket to the broker and its subscription
//! registry. Outbound frames are written through a single locked sink, so
//! concurrent callers never interleave partial frames. The read half is handed
//! back by `new` and consumed by `receive_loop`, which decodes each message and
//! routes it by its `subscription` header.

use std::fmt;
use std::sync::Mutex;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::broker::registry::{Dispatch, SubscriptionRegistry};
use crate::transport::frame::is_heartbeat;
use crate::transport::{Frame, Verb, to_message};
use crate::utils::BridgeError;
use crate::utils::queue::QueuePolicy;
use crate::utils::shutdown::ShutdownSignal;

pub type Inbound<T> = SplitStream<WebSocketStream<T>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnecting,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Auto,
    Client,
}

impl Ack {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ack::Auto => "auto",
            Ack::Client => "client",
        }
    }
}

/// A live subscription: its id, destination and the queue frames arrive on.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    destination: String,
    receiver: mpsc::Receiver<Frame>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Next frame for this subscription, or `None` once it is unsubscribed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }
}

/// Counters reported when the receive loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveStats {
    pub frames: u64,
    pub delivered: u64,
    pub unrouted: u64,
    pub dropped: u64,
    pub decode_errors: u64,
}

pub struct BrokerClient<T> {
    sink: AsyncMutex<SplitSink<WebSocketStream<T>, WsMessage>>,
    registry: SubscriptionRegistry,
    state: Mutex<ConnectionState>,
    accept_version: String,
}

impl<T> BrokerClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        ws_stream: WebSocketStream<T>,
        policy: QueuePolicy,
        accept_version: impl Into<String>,
    ) -> (Self, Inbound<T>) {
        let (sink, inbound) = ws_stream.split();
        let client = Self {
            sink: AsyncMutex::new(sink),
            registry: SubscriptionRegistry::new(policy),
            state: Mutex::new(ConnectionState::Connecting),
            accept_version: accept_version.into(),
        };
        (client, inbound)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    fn ensure_connected(&self) -> Result<(), BridgeError> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            other => Err(BridgeError::NotConnected(other)),
        }
    }

    async fn write_frame(&self, frame: &Frame) -> Result<(), BridgeError> {
        debug!("-> {}", frame.verb());
        self.sink.lock().await.send(to_message(frame)).await?;
        Ok(())
    }

    /// Sends CONNECT. Does not wait for the broker's CONNECTED reply.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        let frame = Frame::new(Verb::Connect).with_header("accept-version", &self.accept_version);
        self.write_frame(&frame).await?;
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// Registers a queue and sends SUBSCRIBE; the registration is rolled back if the write fails.
    pub async fn subscribe(&self, destination: &str, ack: Ack) -> Result<Subscription, BridgeError> {
        self.ensure_connected()?;
        let (id, receiver) = self.registry.register(destination).await;
        let frame = Frame::new(Verb::Subscribe)
            .with_header("id", id.to_string())
            .with_header("destination", destination)
            .with_header("ack", ack.as_str());

        if let Err(e) = self.write_frame(&frame).await {
            self.registry.unregister(id).await;
            return Err(e);
        }

        info!("Subscribed to {destination} as {id}");
        Ok(Subscription {
            id,
            destination: destination.to_string(),
            receiver,
        })
    }

    /// Sends UNSUBSCRIBE and closes the local queue, even when the connection
    /// is gone or the write fails.
    pub async fn unsubscribe(&self, id: Uuid) -> Result<(), BridgeError> {
        let written = match self.ensure_connected() {
            Ok(()) => {
                let frame = Frame::new(Verb::Unsubscribe).with_header("id", id.to_string());
                self.write_frame(&frame).await
            }
            Err(e) => Err(e),
        };
        self.registry.unregister(id).await;
        written
    }

    pub async fn send(
        &self,
        destination: &str,
        body: &[u8],
        content_type: &str,
        transaction: Option<&str>,
    ) -> Result<(), BridgeError> {
        self.ensure_connected()?;
        let content_type = if content_type.is_empty() {
            "text/plain"
        } else {
            content_type
        };
        let mut frame = Frame::new(Verb::Send)
            .with_header("destination", destination)
            .with_header("content-type", content_type)
            .with_body(body);
        if let Some(tx) = transaction.filter(|tx| !tx.is_empty()) {
            frame.set_header("transaction", tx);
        }
        self.write_frame(&frame).await
    }

    pub async fn disconnect(&self, receipt: Uuid) -> Result<(), BridgeError> {
        self.ensure_connected()?;
        self.set_state(ConnectionState::Disconnecting);
        let frame = Frame::new(Verb::Disconnect).with_header("receipt", receipt.to_string());
        let written = self.write_frame(&frame).await;
        let closed = self.sink.lock().await.close().await;
        self.set_state(ConnectionState::Closed);
        written?;
        closed?;
        Ok(())
    }

    /// Reads frames until the broker closes the socket or shutdown fires.
    ///
    /// The connection is marked closed only when the socket ends. Undecodable
    /// frames are counted and skipped. Delivery to a subscriber follows the
    /// registry's queue policy, so frames for one subscription arrive in the
    /// order the broker sent them. A delivery blocked on a full queue is
    /// abandoned when shutdown fires.
    pub async fn receive_loop(
        &self,
        mut inbound: Inbound<T>,
        mut shutdown: ShutdownSignal,
    ) -> Result<ReceiveStats, BridgeError> {
        let mut stats = ReceiveStats::default();

        loop {
            let next = tokio::select! {
                _ = shutdown.triggered() => return Ok(stats),
                next = inbound.next() => next,
            };
            let message = match next {
                None => break,
                Some(Err(e)) => {
                    self.set_state(ConnectionState::Closed);
                    return Err(e.into());
                }
                Some(Ok(message)) => message,
            };
            if message.is_close() {
                info!("Broker closed the websocket");
                break;
            }
            if !(message.is_text() || message.is_binary()) {
                continue;
            }

            let data = message.into_data();
            if is_heartbeat(&data) {
                continue;
            }
            stats.frames += 1;

            let frame = match Frame::decode(&data) {
                Ok(frame) => frame,
                Err(e) => {
                    stats.decode_errors += 1;
                    warn!("Discarding undecodable frame: {e}");
                    continue;
                }
            };

            match frame.verb() {
                Verb::Connected => info!(
                    "Broker accepted connection (version {})",
                    frame.header("version").unwrap_or("unspecified")
                ),
                Verb::Error => warn!(
                    "Broker reported an error: {}",
                    frame.header("message").unwrap_or("no message")
                ),
                Verb::Receipt => debug!(
                    "Receipt {}",
                    frame.header("receipt-id").unwrap_or("without id")
                ),
                _ => {}
            }

            let Some(subscription) = frame.header("subscription").map(str::to_string) else {
                continue;
            };
            let dispatched = tokio::select! {
                _ = shutdown.triggered() => return Ok(stats),
                dispatched = self.registry.dispatch(&subscription, frame) => dispatched,
            };
            match dispatched {
                Ok(Dispatch::Delivered) => stats.delivered += 1,
                Ok(Dispatch::NoSubscriber) => stats.unrouted += 1,
                Ok(Dispatch::Dropped(_)) => stats.dropped += 1,
                Err(e) => {
                    stats.unrouted += 1;
                    warn!("Ignoring frame: {e}");
                }
            }
        }

        self.set_state(ConnectionState::Closed);
        Ok(stats)
    }
}
