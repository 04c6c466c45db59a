//! SerialRelay Bridge Framework
//!
//! Common abstractions for building bridges that act on messages from an MQTT bus.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, console quit)
//! - [`ConnectionMachine`] for the connect, retry and disconnect lifecycle
//! - [`Supervisor`] for driving a [`BusTransport`] and routing messages to a [`MessageHandler`]
//! - [`BridgeArgs`] for common CLI argument parsing
//! - [`BridgeStatus`] for standardized status reporting
//!
//! # Example
//!
//! ```ignore
//! use serialrelay_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<std::process::ExitCode> {
//!     let args = BridgeArgs::parse_for("mybridge", env!("CARGO_PKG_VERSION"));
//!     let config = MyBridgeConfig::load("mybridge.json5")?;
//!
//!     let runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))?;
//!
//!     // Run until the user quits or retries run out
//!     let outcome = runner.run(MyHandler::new()).await?;
//!     Ok(std::process::ExitCode::from(outcome.exit_code()))
//! }
//! ```

mod args;
mod config;
pub mod connection;
pub mod console;
mod error;
mod runner;
mod status;
mod supervisor;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use args::BridgeArgs;
pub use config::{BridgeConfig, DEFAULT_TOPIC, SessionConfig};
pub use connection::{
    Action, ConnectionEvent, ConnectionMachine, ConnectionState, ReconnectPolicy, SessionOutcome,
    StatusKind, Subscription,
};
pub use error::{BridgeError, Result};
pub use runner::BridgeRunner;
pub use status::{BridgeStatus, StatusPublisher};
pub use supervisor::{DEFAULT_DISCONNECT_TIMEOUT, MessageHandler, Supervisor};
pub use transport::{BusTransport, InboundMessage, MqttTransport, TransportEvent};

// Re-export commonly used types from serialrelay-common
pub use serialrelay_common::{LogFormat, LoggingConfig, MqttConfig, QoS};
