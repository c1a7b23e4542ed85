//! Helpers shared by the unit tests: an in-memory websocket pair standing in
//! for the broker connection.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio_tungstenite::WebSocketStream;
use tungstenite::protocol::Role;

use crate::transport::{Frame, to_message};

pub type TestSocket = WebSocketStream<DuplexStream>;

/// Returns `(client, server)` ends of a websocket over `tokio::io::duplex`.
pub async fn ws_pair() -> (TestSocket, TestSocket) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    tokio::join!(
        WebSocketStream::from_raw_socket(client, Role::Client, None),
        WebSocketStream::from_raw_socket(server, Role::Server, None),
    )
}

/// Reads the next data message on the broker end and decodes it.
pub async fn next_frame(server: &mut TestSocket) -> Frame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), server.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("websocket ended")
            .expect("websocket error");
        if msg.is_text() || msg.is_binary() {
            return Frame::decode(&msg.into_data()).expect("client sent an undecodable frame");
        }
    }
}

pub async fn send_frame(server: &mut TestSocket, frame: &Frame) {
    server
        .send(to_message(frame))
        .await
        .expect("failed to send frame to client");
}
