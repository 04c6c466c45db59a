//! Bridge status reporting.

use serde::{Deserialize, Serialize};
use serialrelay_common::QoS;

use crate::Result;
use crate::connection::StatusKind;
use crate::transport::BusTransport;

/// Bridge status information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge name (e.g., "serial").
    pub bridge: String,
    /// Bridge version.
    pub version: String,
    /// Current status ("running", "offline").
    pub status: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Additional metadata (bridge-specific).
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl BridgeStatus {
    /// Create a new status with "running" state.
    pub fn running(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_status(bridge, version, "running")
    }

    /// Create a status with "offline" state.
    pub fn offline(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_status(bridge, version, "offline")
    }

    fn with_status(
        bridge: impl Into<String>,
        version: impl Into<String>,
        status: &str,
    ) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status: status.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Add metadata to the status.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Publishes retained status messages on a fixed topic.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    topic: String,
    bridge_name: String,
    version: String,
    metadata: Option<serde_json::Value>,
}

impl StatusPublisher {
    /// Create a new status publisher.
    pub fn new(
        topic: impl Into<String>,
        bridge_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            bridge_name: bridge_name.into(),
            version: version.into(),
            metadata: None,
        }
    }

    /// Attach metadata to "running" announcements.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Build the status document for `kind`.
    pub fn status(&self, kind: StatusKind) -> BridgeStatus {
        match kind {
            StatusKind::Running => {
                let status = BridgeStatus::running(&self.bridge_name, &self.version);
                match &self.metadata {
                    Some(meta) => status.with_metadata(meta.clone()),
                    None => status,
                }
            }
            StatusKind::Offline => BridgeStatus::offline(&self.bridge_name, &self.version),
        }
    }

    /// Serialized status document for `kind`.
    pub fn payload(&self, kind: StatusKind) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.status(kind))?)
    }

    /// Last will announcing "offline", registered with the broker at connect.
    pub fn last_will(&self) -> Result<rumqttc::LastWill> {
        Ok(rumqttc::LastWill::new(
            self.topic.clone(),
            self.payload(StatusKind::Offline)?,
            QoS::AtLeastOnce.into(),
            true,
        ))
    }

    /// Publish a retained status message.
    pub fn publish<T: BusTransport>(&self, transport: &mut T, kind: StatusKind) -> Result<()> {
        let payload = self.payload(kind)?;
        transport.publish(&self.topic, QoS::AtLeastOnce, true, payload)
    }
}
