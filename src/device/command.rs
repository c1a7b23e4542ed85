/// Terminates every outbound device command.
pub const TERMINATOR: u8 = 0xFF;

const OP_MOTOR: u8 = 0x01;
const OP_TURNOUT: u8 = 0x02;
const OP_SENSOR_READ: u8 = 0x04;

const REVERSE_FLAG: u8 = 0x04;
const SPEED_SPLIT: u8 = 0x40;

/// A command for the attached controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    Motor { channel: u8, speed: u8, reversed: bool },
    /// `length` is not sent; the controller reads a fixed width per address.
    SensorRead { address: u8, length: u8 },
    Turnout { pin: u8 },
}

impl DeviceCommand {
    /// Wire bytes for this command, always ending in [`TERMINATOR`].
    ///
    /// Motor speed is split into `speed / 64` and `speed % 64`; the reverse
    /// flag rides in bit 2 of the high part.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            DeviceCommand::Motor {
                channel,
                speed,
                reversed,
            } => {
                let mut high = speed / SPEED_SPLIT;
                if reversed {
                    high += REVERSE_FLAG;
                }
                vec![OP_MOTOR, channel, high, speed % SPEED_SPLIT, TERMINATOR]
            }
            DeviceCommand::SensorRead { address, .. } => vec![OP_SENSOR_READ, address, TERMINATOR],
            DeviceCommand::Turnout { pin } => vec![OP_TURNOUT, pin, TERMINATOR],
        }
    }
}
