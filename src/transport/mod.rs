//! The `transport` module is responsible for the broker side of the wire.
//!
//! It defines the text-frame codec spoken with the broker and the websocket
//! plumbing that carries those frames over a persistent duplex connection.

pub mod frame;
pub mod websocket;

pub use frame::{Frame, FrameError, Verb};
pub use websocket::{BrokerStream, connect, to_message};
