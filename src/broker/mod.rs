//! The `broker` module turns one websocket connection into many independent
//! topic streams.
//!
//! `SubscriptionRegistry` owns the id-to-queue map; `BrokerClient` owns the
//! connection and the registry and exposes the control operations.

pub mod client;
pub mod registry;

pub use client::{Ack, BrokerClient, ConnectionState, Inbound, ReceiveStats, Subscription};
pub use registry::{Dispatch, SubscriptionRegistry};

#[cfg(test)]
mod tests;
