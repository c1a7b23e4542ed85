//! WebSocket transport
//!
//! Opens the duplex connection to the broker and converts frames to and from
//! websocket messages. One websocket message carries exactly one frame.

use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::info;
use tungstenite::protocol::Message as WsMessage;

use crate::transport::frame::Frame;
use crate::utils::BridgeError;

pub type BrokerStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn connect(url: &str) -> Result<BrokerStream, BridgeError> {
    let (ws_stream, response) = connect_async(url).await?;
    info!("Connected to broker at {url} (HTTP {})", response.status());
    Ok(ws_stream)
}

/// Wraps an encoded frame as a text message, or binary if the bytes are not utf-8.
pub fn to_message(frame: &Frame) -> WsMessage {
    match String::from_utf8(frame.encode()) {
        Ok(text) => WsMessage::text(text),
        Err(e) => WsMessage::binary(e.into_bytes()),
    }
}
