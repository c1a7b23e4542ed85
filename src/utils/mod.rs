//! The `utils` module provides a collection of utility types shared across the
//! bridge.
//!
//! It holds the crate error type, logging setup, the bounded-queue policy used
//! by every delivery channel, and the shutdown signal observed by the loops.

pub mod error;
pub mod logging;
pub mod queue;
pub mod shutdown;

pub use error::BridgeError;
