use serde::Deserialize;
use thiserror::Error;

/// `cmd` value of a sensor-state report.
pub const SENSOR_STATE_CMD: u8 = 4;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// The minimal shape every device line carries. A missing `cmd` reads as 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub cmd: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SensorState {
    pub cmd: u8,
    pub address: u8,
    pub states: Vec<u8>,
}

/// One decoded line from the device.
#[derive(Debug)]
pub enum DeviceResponse {
    Status(Status),
    SensorState(SensorState),
    /// A sensor report (`cmd == 4`) whose body did not match [`SensorState`].
    InvalidSensorState { status: Status, error: DecodeError },
}

impl DeviceResponse {
    /// Parses one line. Fails when the line is not a JSON object or `cmd` is not a byte.
    pub fn decode(line: &[u8]) -> Result<Self, DecodeError> {
        let status: Status = serde_json::from_slice(line)?;
        if status.cmd != SENSOR_STATE_CMD {
            return Ok(DeviceResponse::Status(status));
        }
        Ok(match serde_json::from_slice::<SensorState>(line) {
            Ok(state) => DeviceResponse::SensorState(state),
            Err(e) => DeviceResponse::InvalidSensorState {
                status,
                error: e.into(),
            },
        })
    }

    pub fn cmd(&self) -> u8 {
        match self {
            DeviceResponse::Status(status) => status.cmd,
            DeviceResponse::SensorState(state) => state.cmd,
            DeviceResponse::InvalidSensorState { status, .. } => status.cmd,
        }
    }
}
