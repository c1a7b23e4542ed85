use std::time::Duration;

use serde::Deserialize;

use crate::utils::queue::{Overflow, QueuePolicy};

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub topics: TopicSettings,
    pub device: DeviceSettings,
    pub delivery: DeliverySettings,
    pub logging: LoggingSettings,
}

/// Where the broker lives and which protocol versions to offer it.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub url: String,
    pub accept_version: String,
}

/// Topic names consumed and produced by the bridge.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TopicSettings {
    pub motor_control: String,
    pub sensor: String,
    pub turn_out: String,
    pub response: String,
}

/// Serial port parameters for the controller.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DeviceSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    /// Upper bound on one blocking read, in milliseconds.
    pub read_timeout_ms: u64,
}

impl DeviceSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowSetting {
    Block,
    DropNewest,
    BlockWithTimeout,
}

/// Queue sizing for subscribers and sensor listeners.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DeliverySettings {
    pub queue_capacity: usize,
    pub overflow: OverflowSetting,
    /// Only used with `block_with_timeout`, in milliseconds.
    pub timeout_ms: u64,
}

impl DeliverySettings {
    pub fn policy(&self) -> QueuePolicy {
        let overflow = match self.overflow {
            OverflowSetting::Block => Overflow::Block,
            OverflowSetting::DropNewest => Overflow::DropNewest,
            OverflowSetting::BlockWithTimeout => {
                Overflow::BlockWithTimeout(Duration::from_millis(self.timeout_ms))
            }
        };
        QueuePolicy::new(self.queue_capacity, overflow)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Settings as read from a file or the environment; missing values fall back to defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub topics: Option<PartialTopicSettings>,
    pub device: Option<PartialDeviceSettings>,
    pub delivery: Option<PartialDeliverySettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub url: Option<String>,
    pub accept_version: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialTopicSettings {
    pub motor_control: Option<String>,
    pub sensor: Option<String>,
    pub turn_out: Option<String>,
    pub response: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialDeviceSettings {
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub data_bits: Option<u8>,
    pub read_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialDeliverySettings {
    pub queue_capacity: Option<usize>,
    pub overflow: Option<OverflowSetting>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Settings {
    /// Fills every value missing from `partial` with the default.
    pub fn merge(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let broker = partial.broker.unwrap_or_default();
        let topics = partial.topics.unwrap_or_default();
        let device = partial.device.unwrap_or_default();
        let delivery = partial.delivery.unwrap_or_default();
        let logging = partial.logging.unwrap_or_default();

        Settings {
            broker: BrokerSettings {
                url: broker.url.unwrap_or(default.broker.url),
                accept_version: broker
                    .accept_version
                    .unwrap_or(default.broker.accept_version),
            },
            topics: TopicSettings {
                motor_control: topics
                    .motor_control
                    .unwrap_or(default.topics.motor_control),
                sensor: topics.sensor.unwrap_or(default.topics.sensor),
                turn_out: topics.turn_out.unwrap_or(default.topics.turn_out),
                response: topics.response.unwrap_or(default.topics.response),
            },
            device: DeviceSettings {
                port: device.port.unwrap_or(default.device.port),
                baud_rate: device.baud_rate.unwrap_or(default.device.baud_rate),
                data_bits: device.data_bits.unwrap_or(default.device.data_bits),
                read_timeout_ms: device
                    .read_timeout_ms
                    .unwrap_or(default.device.read_timeout_ms),
            },
            delivery: DeliverySettings {
                queue_capacity: delivery
                    .queue_capacity
                    .unwrap_or(default.delivery.queue_capacity),
                overflow: delivery.overflow.unwrap_or(default.delivery.overflow),
                timeout_ms: delivery.timeout_ms.unwrap_or(default.delivery.timeout_ms),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                url: "ws://localhost:8080/pi-train-broker/agent-websocket".to_string(),
                accept_version: "1.0,1.1,2.0".to_string(),
            },
            topics: TopicSettings {
                motor_control: "/topic/motor-control".to_string(),
                sensor: "/topic/sensor".to_string(),
                turn_out: "/topic/turn-out".to_string(),
                response: "/topic/response".to_string(),
            },
            device: DeviceSettings {
                port: "/dev/ttyACM0".to_string(),
                baud_rate: 9600,
                data_bits: 8,
                read_timeout_ms: 100,
            },
            delivery: DeliverySettings {
                queue_capacity: 16,
                overflow: OverflowSetting::BlockWithTimeout,
                timeout_ms: 1000,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
