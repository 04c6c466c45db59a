//! Bridge runner for lifecycle management.

use std::future::Future;

use tokio::sync::watch;

use serialrelay_common::{LoggingConfig, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::connection::{ConnectionMachine, SessionOutcome};
use crate::console;
use crate::error::{BridgeError, Result};
use crate::status::StatusPublisher;
use crate::supervisor::{MessageHandler, Supervisor};
use crate::transport::{BusTransport, MqttTransport};

/// Bridge runner that manages the lifecycle of a bus bridge.
///
/// Handles:
/// - Logging initialization
/// - MQTT client construction (with a last will when status is enabled)
/// - Shutdown on `q` from the console or Ctrl+C
/// - Handing the session to a [`Supervisor`]
///
/// # Example
///
/// ```ignore
/// use serialrelay_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<std::process::ExitCode> {
///     let args = BridgeArgs::parse_for("mybridge", env!("CARGO_PKG_VERSION"));
///     let config = MyBridgeConfig::load("mybridge.json5")?;
///
///     let runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))?;
///     let outcome = runner.run(MyHandler::new()).await?;
///
///     Ok(std::process::ExitCode::from(outcome.exit_code()))
/// }
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging and status.
    name: String,
    /// Bridge version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// Extra fields for the "running" status message.
    metadata: Option<serde_json::Value>,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a new bridge runner and initialize logging from the config,
    /// honoring a `--log-level` override from the CLI.
    pub fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let runner = Self::from_parts(name, env!("CARGO_PKG_VERSION"), config);

        // Initialize logging with optional CLI override
        let log_config = match args.and_then(|a| a.log_level.as_ref()) {
            Some(level) => LoggingConfig {
                level: level.clone(),
                format: runner.config.logging().format,
            },
            None => runner.config.logging().clone(),
        };

        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        tracing::info!(bridge = %runner.name, version = %runner.version, "Starting bridge");

        Ok(runner)
    }

    /// Create a runner without touching the global tracing subscriber.
    pub fn from_parts(name: impl Into<String>, version: impl Into<String>, config: C) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            config,
            metadata: None,
        }
    }

    /// Attach bridge-specific fields to the "running" status message.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Status publisher for the configured status topic, if any.
    pub fn status_publisher(&self) -> Option<StatusPublisher> {
        let topic = self.config.session().status_topic.as_ref()?;
        let publisher = StatusPublisher::new(topic, &self.name, &self.version);
        Some(match &self.metadata {
            Some(meta) => publisher.with_metadata(meta.clone()),
            None => publisher,
        })
    }

    /// Run the bridge against the configured MQTT server until the session ends.
    ///
    /// Shutdown is requested by typing `q` on the console or pressing Ctrl+C.
    pub async fn run<H>(self, handler: H) -> Result<SessionOutcome>
    where
        H: MessageHandler,
    {
        let last_will = self
            .status_publisher()
            .map(|status| status.last_will())
            .transpose()?;
        let transport = MqttTransport::from_config(self.config.mqtt(), last_will)?;

        tracing::info!(bridge = %self.name, "Press Q<Enter> to quit");

        self.run_until(transport, handler, console::shutdown_signal())
            .await
    }

    /// Run the session over `transport` until it ends, requesting a graceful
    /// disconnect once `shutdown` resolves.
    pub async fn run_until<T, H, F>(
        self,
        transport: T,
        handler: H,
        shutdown: F,
    ) -> Result<SessionOutcome>
    where
        T: BusTransport,
        H: MessageHandler,
        F: Future<Output = ()> + Send + 'static,
    {
        let session = self.config.session();
        let machine = ConnectionMachine::new(session.subscription(), session.reconnect);

        let mut supervisor = Supervisor::new(transport, handler, machine)
            .with_disconnect_timeout(session.disconnect_timeout());
        if let Some(status) = self.status_publisher() {
            supervisor = supervisor.with_status(status);
        }

        let (tx, rx) = watch::channel(false);
        let watcher = tokio::spawn(async move {
            shutdown.await;
            let _ = tx.send(true);
        });

        let outcome = supervisor.run(rx).await;
        watcher.abort();

        tracing::info!(bridge = %self.name, outcome = %outcome, "Bridge stopped");

        Ok(outcome)
    }
}
