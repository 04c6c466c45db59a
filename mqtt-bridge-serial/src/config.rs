//! Configuration for the serial bridge.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialrelay_bridge_framework::{
    BridgeConfig, BridgeError, LoggingConfig, MqttConfig, Result, SessionConfig,
};

/// Default serial port.
#[cfg(windows)]
pub const DEFAULT_PORT: &str = "COM3";
/// Default serial port.
#[cfg(not(windows))]
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

/// Default baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SerialBridgeConfig {
    /// MQTT connection settings
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Subscription, retry and status settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Serial device settings
    #[serde(default)]
    pub serial: SerialConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig for SerialBridgeConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn session(&self) -> &SessionConfig {
        &self.session
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<()> {
        self.mqtt.validate()?;
        self.session.validate()?;
        self.serial.validate()
    }
}

/// Serial device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyACM0" or "COM3")
    #[serde(default = "default_port")]
    pub port: String,

    /// Baud rate (default: 115200)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Read/write timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(BridgeError::validation("serial.port must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(BridgeError::validation("serial.baud_rate must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialrelay_bridge_framework::QoS;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: SerialBridgeConfig = json5::from_str("{}").unwrap();
        config.validate().unwrap();

        assert_eq!(config.mqtt.broker, "mqtt://localhost:1883");
        assert_eq!(config.mqtt.client_id, "test_client");
        assert!(!config.mqtt.clean_session);
        assert_eq!(config.session.topic, "test");
        assert_eq!(config.session.qos, QoS::AtLeastOnce);
        assert_eq!(config.serial.port, DEFAULT_PORT);
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"
        {
            mqtt: {
                broker: "tcp://broker.lan:1884",
                client_id: "relay-1",
                clean_session: true,
            },
            session: {
                topic: "lab/relay",
                qos: 0,
                reconnect: { max_retries: 3, backoff_ms: 1000 },
                status_topic: "lab/relay/status",
            },
            serial: {
                port: "/dev/ttyUSB0",
                baud_rate: 9600,
            },
            logging: { level: "debug", format: "json" },
        }
        "#;

        let config: SerialBridgeConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.mqtt.client_id, "relay-1");
        assert_eq!(config.session.qos, QoS::AtMostOnce);
        assert_eq!(config.session.reconnect.max_retries, 3);
        assert_eq!(
            config.session.status_topic.as_deref(),
            Some("lab/relay/status")
        );
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.timeout_ms, 1000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_empty_port_rejected() {
        let config: SerialBridgeConfig = json5::from_str(r#"{ serial: { port: "" } }"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(BridgeError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_zero_baud_rejected() {
        let config: SerialBridgeConfig =
            json5::from_str(r#"{ serial: { baud_rate: 0 } }"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_topic_rejected() {
        let config: SerialBridgeConfig =
            json5::from_str(r#"{ session: { topic: "" } }"#).unwrap();
        assert!(config.validate().is_err());
    }
}
