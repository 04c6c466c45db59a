use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default broker address.
pub const DEFAULT_BROKER: &str = "mqtt://localhost:1883";

/// Default MQTT client identifier.
pub const DEFAULT_CLIENT_ID: &str = "test_client";

/// Common MQTT connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker address, `mqtt://host[:port]` or `tcp://host[:port]`.
    #[serde(default = "default_broker")]
    pub broker: String,

    /// Client identifier presented to the broker.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Start a clean session on every connect.
    ///
    /// Keep `false` so the broker retains the subscription across reconnects.
    #[serde(default)]
    pub clean_session: bool,

    /// Keep-alive interval in seconds (0 disables keep-alive).
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Capacity of the client request queue.
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

fn default_broker() -> String {
    DEFAULT_BROKER.to_string()
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_request_capacity() -> usize {
    16
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            client_id: default_client_id(),
            clean_session: false,
            keep_alive_secs: default_keep_alive_secs(),
            request_capacity: default_request_capacity(),
        }
    }
}

impl MqttConfig {
    /// Check the settings the MQTT client would otherwise reject at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() || self.client_id.starts_with(' ') {
            return Err(Error::Config(
                "client_id must not be empty or start with a space".to_string(),
            ));
        }
        if self.keep_alive_secs > u64::from(u16::MAX) {
            return Err(Error::Config(format!(
                "keep_alive_secs must be at most {}, got {}",
                u16::MAX,
                self.keep_alive_secs
            )));
        }
        if self.request_capacity == 0 {
            return Err(Error::Config(
                "request_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mqtt_config() {
        let json5 = r#"
        {
            broker: "tcp://broker.local:1884",
            client_id: "relay-01",
            clean_session: true,
            keep_alive_secs: 30,
        }
        "#;

        let config: MqttConfig = json5::from_str(json5).unwrap();

        assert_eq!(config.broker, "tcp://broker.local:1884");
        assert_eq!(config.client_id, "relay-01");
        assert!(config.clean_session);
        assert_eq!(config.keep_alive_secs, 30);
    }

    #[test]
    fn test_default_config() {
        let mqtt: MqttConfig = json5::from_str("{}").unwrap();
        assert_eq!(mqtt, MqttConfig::default());
        assert_eq!(mqtt.broker, "mqtt://localhost:1883");
        assert_eq!(mqtt.client_id, "test_client");
        assert!(!mqtt.clean_session);
        assert_eq!(mqtt.request_capacity, 16);

        let logging: LoggingConfig = json5::from_str("{}").unwrap();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, LogFormat::Text);
    }

    #[test]
    fn test_json_logging_format() {
        let logging: LoggingConfig =
            json5::from_str(r#"{ level: "debug", format: "json" }"#).unwrap();

        assert_eq!(logging.level, "debug");
        assert_eq!(logging.format, LogFormat::Json);
    }

    #[test]
    fn test_client_id_required() {
        let config = MqttConfig {
            client_id: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MqttConfig {
            client_id: " relay".to_string(),
            clean_session: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(MqttConfig::default().validate().is_ok());
    }

    #[test]
    fn test_keep_alive_must_fit_protocol_field() {
        let config = MqttConfig {
            keep_alive_secs: 65_535,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = MqttConfig {
            keep_alive_secs: 65_536,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("keep_alive_secs"));

        let config = MqttConfig {
            keep_alive_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
