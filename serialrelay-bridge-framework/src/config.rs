//! Configuration traits and utilities.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serialrelay_common::{QoS, validate_topic_filter, validate_topic_name};

use crate::connection::{ReconnectPolicy, Subscription};
use crate::error::{BridgeError, Result};
use crate::{LoggingConfig, MqttConfig};

/// Default subscription topic.
pub const DEFAULT_TOPIC: &str = "test";

/// Bus session settings: what to subscribe to and how to recover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Topic filter to subscribe to.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Subscription QoS level (0, 1 or 2).
    #[serde(default)]
    pub qos: QoS,

    /// Retry policy for connect attempts.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Time allowed for a graceful disconnect, in milliseconds.
    #[serde(default = "default_disconnect_timeout_ms")]
    pub disconnect_timeout_ms: u64,

    /// Topic for retained bridge status messages; disabled when unset.
    #[serde(default)]
    pub status_topic: Option<String>,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_disconnect_timeout_ms() -> u64 {
    5000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            qos: QoS::default(),
            reconnect: ReconnectPolicy::default(),
            disconnect_timeout_ms: default_disconnect_timeout_ms(),
            status_topic: None,
        }
    }
}

impl SessionConfig {
    pub fn subscription(&self) -> Subscription {
        Subscription::new(self.topic.clone(), self.qos)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    /// Validate topics.
    pub fn validate(&self) -> Result<()> {
        validate_topic_filter(&self.topic)?;
        if let Some(status_topic) = &self.status_topic {
            validate_topic_name(status_topic)?;
        }
        Ok(())
    }
}

/// Trait for bridge configuration types.
///
/// Implement this trait for your bridge's configuration struct to get
/// automatic loading, validation, and access to common config fields.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use serialrelay_bridge_framework::{BridgeConfig, LoggingConfig, MqttConfig, SessionConfig};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyBridgeConfig {
///     pub mqtt: MqttConfig,
///     pub session: SessionConfig,
///     pub logging: LoggingConfig,
///     pub my_device: MyDeviceConfig,
/// }
///
/// impl BridgeConfig for MyBridgeConfig {
///     fn mqtt(&self) -> &MqttConfig {
///         &self.mqtt
///     }
///
///     fn session(&self) -> &SessionConfig {
///         &self.session
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Get the MQTT connection configuration.
    fn mqtt(&self) -> &MqttConfig;

    /// Get the bus session configuration.
    fn session(&self) -> &SessionConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. The default checks the MQTT and
    /// session sections; override to add bridge-specific checks.
    fn validate(&self) -> Result<()> {
        self.mqtt().validate()?;
        self.session().validate()
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        #[serde(default)]
        mqtt: MqttConfig,
        #[serde(default)]
        session: SessionConfig,
        #[serde(default)]
        logging: LoggingConfig,
    }

    impl BridgeConfig for TestConfig {
        fn mqtt(&self) -> &MqttConfig {
            &self.mqtt
        }

        fn session(&self) -> &SessionConfig {
            &self.session
        }

        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }
    }

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_config_not_found() {
        let result = TestConfig::load("/nonexistent/path.json5");
        assert!(matches!(result, Err(BridgeError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_session_defaults() {
        let session = SessionConfig::default();
        assert_eq!(session.topic, "test");
        assert_eq!(session.qos, QoS::AtLeastOnce);
        assert_eq!(session.reconnect.max_retries, 5);
        assert_eq!(session.reconnect.backoff(), Duration::from_millis(2500));
        assert_eq!(session.disconnect_timeout(), Duration::from_secs(5));
        assert!(session.status_topic.is_none());
    }

    #[test]
    fn test_load_and_validate() {
        let path = write_temp(
            "session.json5",
            r#"{ session: { topic: "lab/relay/+", qos: 2, reconnect: { backoff_ms: 100 } } }"#,
        );
        let config = TestConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.session.topic, "lab/relay/+");
        assert_eq!(config.session.qos, QoS::ExactlyOnce);
        assert_eq!(config.session.reconnect.max_retries, 5);
        assert_eq!(config.session.reconnect.backoff_ms, 100);
    }

    #[test]
    fn test_invalid_topic_rejected() {
        let path = write_temp("bad-topic.json5", r#"{ session: { topic: "lab/#/relay" } }"#);
        let result = TestConfig::load(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(BridgeError::ConfigValidation(_))));
    }

    #[test]
    fn test_wildcard_status_topic_rejected() {
        let session = SessionConfig {
            status_topic: Some("relay/+/status".to_string()),
            ..Default::default()
        };
        assert!(session.validate().is_err());
    }

    #[test]
    fn test_invalid_qos_is_parse_error() {
        let path = write_temp("bad-qos.json5", r#"{ session: { qos: 3 } }"#);
        let result = TestConfig::load(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(BridgeError::ConfigParse(_))));
    }
}
