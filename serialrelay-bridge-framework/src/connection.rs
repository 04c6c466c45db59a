//! Bus connection lifecycle.
//!
//! [`ConnectionMachine`] is a pure state machine: it consumes
//! [`ConnectionEvent`]s and answers with the [`Action`]s the caller must
//! perform. It never touches the network, which keeps the retry policy and the
//! re-subscription contract testable without a broker.
//!
//! ```text
//!  Disconnected ──connect──► Connecting ──ok──► Connected ──lost──► Lost
//!                               │                 ▲    │              │
//!                             fail                │    │ disconnect   │ (retries := 0)
//!                               ▼                 │    ▼              ▼
//!                          Reconnecting ───ok─────┘  Disconnecting  Reconnecting
//!                               │                      │
//!                  fail, retries > max            done │ failed
//!                               ▼                      ▼
//!                            Failed                  Closed
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialrelay_common::QoS;
use tracing::{debug, error, info, trace, warn};

use crate::transport::InboundMessage;

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default fixed delay between connect attempts, in milliseconds.
pub const DEFAULT_BACKOFF_MS: u64 = 2500;

/// Fixed-interval retry policy for connect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Consecutive failures tolerated; the failure after that ends the session.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before every reconnect attempt, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the next connect attempt.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Topic and QoS the session subscribes to after every successful connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub qos: QoS,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            qos,
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Nothing attempted yet.
    Disconnected,
    /// First connect attempt in flight.
    Connecting,
    /// Session established and subscription requested.
    Connected,
    /// Connection dropped; passed through on the way to `Reconnecting`.
    Lost,
    /// Waiting out the backoff or retrying a connect.
    Reconnecting,
    /// User-initiated disconnect in flight.
    Disconnecting,
    /// Retry bound exceeded. Terminal.
    Failed,
    /// User-initiated disconnect finished, successfully or not. Terminal.
    Closed,
}

impl ConnectionState {
    /// Whether the machine accepts no further events.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Lost => "lost",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Discrete inputs to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Start the session.
    ConnectRequested,
    /// The broker accepted a connect.
    ConnectSucceeded { session_present: bool },
    /// A connect attempt failed.
    ConnectFailed { cause: String },
    /// An established connection dropped.
    ConnectionLost { cause: Option<String> },
    /// A message arrived on a subscribed topic.
    MessageArrived(InboundMessage),
    /// An outgoing publication was acknowledged.
    DeliveryComplete,
    /// The user asked to stop.
    DisconnectRequested,
    /// The disconnect packet went out.
    DisconnectCompleted,
    /// The disconnect could not be performed.
    DisconnectFailed { cause: String },
}

/// Status announcement kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Running,
    Offline,
}

/// Work the caller must perform on behalf of the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Attempt a connect now.
    Connect,
    /// Attempt a connect once the delay has elapsed.
    ConnectAfter(Duration),
    /// Request a subscription.
    Subscribe { topic: String, qos: QoS },
    /// Hand a message to the message handler.
    Route(InboundMessage),
    /// Announce bridge status, if status reporting is enabled.
    PublishStatus(StatusKind),
    /// Request a disconnect.
    Disconnect,
    /// End the session.
    Exit(SessionOutcome),
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// User quit and the disconnect went out.
    Disconnected,
    /// User quit but the disconnect could not be performed.
    DisconnectFailed { cause: String },
    /// Too many consecutive connect failures.
    RetriesExhausted { attempts: u32 },
}

impl SessionOutcome {
    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            SessionOutcome::Disconnected => 0,
            SessionOutcome::DisconnectFailed { .. } | SessionOutcome::RetriesExhausted { .. } => 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::Disconnected => write!(f, "disconnected"),
            SessionOutcome::DisconnectFailed { cause } => write!(f, "disconnect failed: {}", cause),
            SessionOutcome::RetriesExhausted { attempts } => {
                write!(f, "gave up after {} failed connection attempts", attempts)
            }
        }
    }
}

/// The connection lifecycle state machine.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    retries: u32,
    policy: ReconnectPolicy,
    subscription: Subscription,
}

impl ConnectionMachine {
    pub fn new(subscription: Subscription, policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retries: 0,
            policy,
            subscription,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive connect failures since the last success or loss.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Interpret a transport error in light of the current state.
    pub fn classify_error(&self, cause: String) -> ConnectionEvent {
        match self.state {
            ConnectionState::Connected => ConnectionEvent::ConnectionLost {
                cause: Some(cause).filter(|c| !c.is_empty()),
            },
            ConnectionState::Disconnecting => ConnectionEvent::DisconnectFailed { cause },
            _ => ConnectionEvent::ConnectFailed { cause },
        }
    }

    /// Feed one event and collect the resulting actions, in order.
    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<Action> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        if self.state.is_terminal() {
            trace!(state = %self.state, ?event, "Ignoring event in terminal state");
            return Vec::new();
        }

        match (self.state, event) {
            (S::Disconnected, E::ConnectRequested) => {
                self.transition(S::Connecting);
                vec![Action::Connect]
            }

            (S::Connecting | S::Reconnecting, E::ConnectSucceeded { session_present }) => {
                self.retries = 0;
                self.transition(S::Connected);
                info!(session_present, "Connection success");
                info!(
                    topic = %self.subscription.topic,
                    qos = %self.subscription.qos,
                    "Subscribing to topic"
                );
                vec![
                    Action::Subscribe {
                        topic: self.subscription.topic.clone(),
                        qos: self.subscription.qos,
                    },
                    Action::PublishStatus(StatusKind::Running),
                ]
            }

            (S::Connecting | S::Reconnecting, E::ConnectFailed { cause }) => {
                self.retries += 1;
                warn!(
                    attempt = self.retries,
                    max_retries = self.policy.max_retries,
                    cause = %cause,
                    "Connection attempt failed"
                );

                if self.retries > self.policy.max_retries {
                    self.transition(S::Failed);
                    error!(attempts = self.retries, "Retry limit exceeded, giving up");
                    vec![Action::Exit(SessionOutcome::RetriesExhausted {
                        attempts: self.retries,
                    })]
                } else {
                    self.transition(S::Reconnecting);
                    vec![Action::ConnectAfter(self.policy.backoff())]
                }
            }

            (S::Connected, E::ConnectionLost { cause }) => {
                self.transition(S::Lost);
                match cause.as_deref() {
                    Some(cause) if !cause.is_empty() => warn!(cause = %cause, "Connection lost"),
                    _ => warn!("Connection lost"),
                }

                self.retries = 0;
                self.transition(S::Reconnecting);
                info!(backoff_ms = self.policy.backoff_ms, "Reconnecting...");
                vec![Action::ConnectAfter(self.policy.backoff())]
            }

            (S::Connected | S::Disconnecting, E::MessageArrived(message)) => {
                vec![Action::Route(message)]
            }

            (state, E::MessageArrived(message)) => {
                warn!(
                    state = %state,
                    topic = %message.topic,
                    "Dropping message received while not connected"
                );
                Vec::new()
            }

            (_, E::DeliveryComplete) => {
                trace!("Delivery complete");
                Vec::new()
            }

            (S::Connected, E::DisconnectRequested) => {
                self.transition(S::Disconnecting);
                info!("Disconnecting from the MQTT server...");
                vec![Action::PublishStatus(StatusKind::Offline), Action::Disconnect]
            }

            (state, E::DisconnectRequested) => {
                self.transition(S::Closed);
                vec![Action::Exit(SessionOutcome::DisconnectFailed {
                    cause: format!("not connected ({})", state),
                })]
            }

            (S::Disconnecting, E::DisconnectCompleted) => {
                self.transition(S::Closed);
                vec![Action::Exit(SessionOutcome::Disconnected)]
            }

            (S::Disconnecting, E::DisconnectFailed { cause }) => {
                self.transition(S::Closed);
                vec![Action::Exit(SessionOutcome::DisconnectFailed { cause })]
            }

            (S::Disconnecting, E::ConnectionLost { cause }) => {
                self.transition(S::Closed);
                vec![Action::Exit(SessionOutcome::DisconnectFailed {
                    cause: cause.unwrap_or_else(|| "connection lost".to_string()),
                })]
            }

            (state, event) => {
                warn!(state = %state, ?event, "Ignoring unexpected connection event");
                Vec::new()
            }
        }
    }

    fn transition(&mut self, to: ConnectionState) {
        debug!(from = %self.state, to = %to, retries = self.retries, "Connection state changed");
        self.state = to;
    }
}
