//! # TrackBridge
//!
//! `trackbridge` connects a publish/subscribe message broker, reached over a
//! websocket speaking a text-frame protocol, to a model-railway controller on a
//! serial port speaking a small binary command protocol.
//!
//! ## Core Modules
//!
//! - `transport`: The text-frame codec and the websocket connection to the broker.
//! - `broker`: The subscription registry and the client that multiplexes topics over one connection.
//! - `device`: The controller's command codec, the single-writer serial link, response decoding and sensor fan-out.
//! - `bridge`: Wires command topics to the device and device responses back to the broker.
//! - `config`: Handles loading and managing configuration.
//! - `utils`: Shared error type, logging, queue policy and shutdown signalling.

pub mod bridge;
pub mod broker;
pub mod config;
pub mod device;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod test_support;
