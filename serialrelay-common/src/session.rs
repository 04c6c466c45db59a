use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions};
use url::Url;

use crate::config::MqttConfig;
use crate::error::{Error, Result};

/// Port used when the broker address does not name one.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Broker host and port extracted from a broker address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

/// Parse a broker address of the form `mqtt://host[:port]` or `tcp://host[:port]`.
pub fn parse_broker(address: &str) -> Result<BrokerAddress> {
    let url = Url::parse(address)
        .map_err(|e| Error::Config(format!("Invalid broker address '{}': {}", address, e)))?;

    match url.scheme() {
        "mqtt" | "tcp" => {}
        other => {
            return Err(Error::Config(format!(
                "Unsupported broker scheme '{}'. Expected 'mqtt' or 'tcp'",
                other
            )));
        }
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::Config(format!("Broker address '{}' has no host", address)))?;

    if !matches!(url.path(), "" | "/") {
        return Err(Error::Config(format!(
            "Broker address '{}' must not contain a path",
            address
        )));
    }

    Ok(BrokerAddress {
        host: host.to_string(),
        port: url.port().unwrap_or(DEFAULT_MQTT_PORT),
    })
}

/// Build MQTT client options from the configuration.
pub fn mqtt_options(config: &MqttConfig, last_will: Option<LastWill>) -> Result<MqttOptions> {
    config.validate()?;
    let broker = parse_broker(&config.broker)?;

    let mut options = MqttOptions::new(config.client_id.clone(), broker.host, broker.port);
    options
        .set_clean_session(config.clean_session)
        .set_keep_alive(Duration::from_secs(config.keep_alive_secs));

    if let Some(will) = last_will {
        options.set_last_will(will);
    }

    Ok(options)
}

/// Create an MQTT client and its event loop.
///
/// No network traffic happens here: the connection is attempted by the first
/// poll of the returned [`EventLoop`], and again by every poll after an error.
pub fn connect(config: &MqttConfig, last_will: Option<LastWill>) -> Result<(AsyncClient, EventLoop)> {
    let options = mqtt_options(config, last_will)?;

    tracing::info!(
        broker = %config.broker,
        client_id = %config.client_id,
        clean_session = config.clean_session,
        "Prepared MQTT session"
    );

    Ok(AsyncClient::new(options, config.request_capacity))
}
