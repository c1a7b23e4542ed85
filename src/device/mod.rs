//! The `device` module speaks the controller's binary command protocol.
//!
//! Outbound, `DeviceCommand` encodes motor, sensor-read and turnout commands
//! and `DeviceWriter` serializes them onto the port. Inbound, newline-delimited
//! status lines are decoded, forwarded to a `ResponseSink`, and sensor reports
//! are broadcast through `SensorFanout`.

pub mod command;
pub mod fanout;
pub mod pump;
pub mod response;
pub mod serial;

pub use command::DeviceCommand;
pub use fanout::SensorFanout;
pub use pump::{DeviceStats, ResponseSink, pump_responses};
pub use response::{DecodeError, DeviceResponse, SensorState, Status};
pub use serial::{DeviceLine, DeviceWriter, open_serial, spawn_line_reader};
