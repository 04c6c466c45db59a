//! MQTT bridge for a serial-controlled actuator.
//!
//! Subscribes to a topic and writes `1`/`0` commands to a serial device.

use std::process::ExitCode;

use anyhow::{Context, Result};
use mqtt_bridge_serial::config::SerialBridgeConfig;
use mqtt_bridge_serial::device::{SerialDevice, TtyDevice};
use mqtt_bridge_serial::dispatcher::CommandDispatcher;
use mqtt_bridge_serial::router::MessageRouter;
use serialrelay_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
use tracing::info;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = BridgeArgs::parse_for("mqtt-bridge-serial", env!("CARGO_PKG_VERSION"));

    // Load configuration, falling back to built-in defaults
    let config = match &args.config {
        Some(path) => SerialBridgeConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => {
            let config = SerialBridgeConfig::default();
            config.validate().context("Invalid default configuration")?;
            config
        }
    };

    let metadata = serde_json::json!({
        "topic": config.session.topic,
        "qos": config.session.qos,
        "port": config.serial.port,
    });

    let runner = BridgeRunner::new_with_args("serial", config, Some(&args))
        .context("Failed to start bridge")?
        .with_metadata(metadata);

    match &args.config {
        Some(path) => info!(path = ?path, "Loaded configuration"),
        None => info!("Using default configuration"),
    }

    let device = TtyDevice::from_config(&runner.config().serial);
    info!(
        port = %device.name(),
        baud_rate = device.baud_rate(),
        broker = %runner.config().mqtt.broker,
        topic = %runner.config().session.topic,
        "Serial bridge configured"
    );

    let router = MessageRouter::new(CommandDispatcher::new(device));
    let outcome = runner.run(router).await.context("Bridge failed")?;

    Ok(ExitCode::from(outcome.exit_code()))
}
