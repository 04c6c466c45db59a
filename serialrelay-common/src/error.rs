use thiserror::Error;

/// Common error type for SerialRelay components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid topic: {0}")]
    Topic(String),

    #[error("Invalid QoS level: {0}")]
    QoS(u8),
}

/// Result type alias using SerialRelay's Error.
pub type Result<T> = std::result::Result<T, Error>;
