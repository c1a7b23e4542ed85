use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::device::DeviceCommand;

/// Bytes per sensor read; the controller always reads this many.
pub const SENSOR_READ_LENGTH: u8 = 2;

/// A topic message body that maps onto one device command.
pub trait CommandPayload: DeserializeOwned + Send + 'static {
    fn command(&self) -> DeviceCommand;
    fn describe(&self) -> String;
}

/// Body of `/topic/motor-control`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MotorControl {
    #[serde(default)]
    pub id: i64,
    pub channel: u8,
    pub reversed: bool,
    pub speed: u8,
}

/// Body of `/topic/sensor`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SensorRequest {
    #[serde(default)]
    pub id: i64,
    pub address: u8,
}

/// Body of `/topic/turn-out`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOut {
    #[serde(default)]
    pub id: i64,
    pub forward_pin: u8,
    pub turn_out_pin: u8,
    pub turned_out: bool,
}

impl TurnOut {
    /// The pin to pulse: `turn_out_pin` when turning out, `forward_pin` otherwise.
    pub fn selected_pin(&self) -> u8 {
        if self.turned_out {
            self.turn_out_pin
        } else {
            self.forward_pin
        }
    }
}

impl CommandPayload for MotorControl {
    fn command(&self) -> DeviceCommand {
        DeviceCommand::Motor {
            channel: self.channel,
            speed: self.speed,
            reversed: self.reversed,
        }
    }

    fn describe(&self) -> String {
        let direction = if self.reversed { "reverse" } else { "forward" };
        format!(
            "Setting channel {} to {direction} at speed {}",
            self.channel, self.speed
        )
    }
}

impl CommandPayload for SensorRequest {
    fn command(&self) -> DeviceCommand {
        DeviceCommand::SensorRead {
            address: self.address,
            length: SENSOR_READ_LENGTH,
        }
    }

    fn describe(&self) -> String {
        format!("Reading from sensor {:#04x}", self.address)
    }
}

impl CommandPayload for TurnOut {
    fn command(&self) -> DeviceCommand {
        DeviceCommand::Turnout {
            pin: self.selected_pin(),
        }
    }

    fn describe(&self) -> String {
        format!("Sending a pulse to pin {}", self.selected_pin())
    }
}
