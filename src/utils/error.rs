//! The `error` module defines the error type shared by every part of the bridge.
//!
//! Codec-level errors (`FrameError`, `DecodeError`) live next to their codecs
//! and convert into `BridgeError` so they can be propagated with `?`.

use std::io;

use thiserror::Error;

use crate::broker::ConnectionState;
use crate::device::DecodeError;
use crate::transport::FrameError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("malformed device line: {0}")]
    Decode(#[from] DecodeError),

    #[error("subscription id {value:?} is not a valid uuid")]
    InvalidSubscriptionId {
        value: String,
        #[source]
        source: uuid::Error,
    },

    #[error("broker connection is {0}, expected connected")]
    NotConnected(ConnectionState),

    #[error("broker closed the connection")]
    BrokerClosed,

    #[error("failed to write device command: {0}")]
    DeviceWrite(#[source] io::Error),

    #[error("failed to read from device: {0}")]
    DeviceRead(#[source] io::Error),

    #[error("device channel closed")]
    DeviceClosed,

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("task failed: {0}")]
    Task(String),
}
