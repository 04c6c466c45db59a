//! Session supervisor: drives a [`BusTransport`] through the connection
//! state machine until the session ends.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::connection::{
    Action, ConnectionEvent, ConnectionMachine, SessionOutcome, StatusKind,
};
use crate::status::StatusPublisher;
use crate::transport::{BusTransport, InboundMessage, TransportEvent};

/// Default time allowed for a user-initiated disconnect.
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives every message the session delivers, one at a time.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: InboundMessage) -> impl Future<Output = ()> + Send;
}

/// Owns the transport and applies the state machine's actions.
pub struct Supervisor<T, H> {
    transport: T,
    handler: H,
    machine: ConnectionMachine,
    status: Option<StatusPublisher>,
    disconnect_timeout: Duration,
}

impl<T: BusTransport, H: MessageHandler> Supervisor<T, H> {
    pub fn new(transport: T, handler: H, machine: ConnectionMachine) -> Self {
        Self {
            transport,
            handler,
            machine,
            status: None,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
        }
    }

    /// Announce bridge status on the publisher's topic.
    pub fn with_status(mut self, status: StatusPublisher) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Run the session until it ends.
    ///
    /// `shutdown` flipping to `true`, or its sender going away, requests a
    /// graceful disconnect.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SessionOutcome {
        let mut pending: VecDeque<Action> =
            self.machine.handle(ConnectionEvent::ConnectRequested).into();
        let mut shutdown_requested = false;
        let mut disconnect_deadline: Option<Instant> = None;

        info!(
            topic = %self.machine.subscription().topic,
            "Connecting to the MQTT server..."
        );

        loop {
            while let Some(action) = pending.pop_front() {
                match action {
                    Action::Connect => {
                        debug!("Connect attempt on next poll");
                    }
                    Action::ConnectAfter(delay) => {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = wait_shutdown(&mut shutdown), if !shutdown_requested => {
                                shutdown_requested = true;
                                pending.clear();
                                pending.extend(self.machine.handle(ConnectionEvent::DisconnectRequested));
                            }
                        }
                    }
                    Action::Subscribe { topic, qos } => {
                        if let Err(e) = self.transport.subscribe(&topic, qos) {
                            error!(topic = %topic, error = %e, "Failed to request subscription");
                        }
                    }
                    Action::Route(message) => {
                        self.handler.handle(message).await;
                    }
                    Action::PublishStatus(kind) => self.publish_status(kind),
                    Action::Disconnect => {
                        disconnect_deadline = Some(Instant::now() + self.disconnect_timeout);
                        if let Err(e) = self.transport.disconnect() {
                            pending.extend(self.machine.handle(ConnectionEvent::DisconnectFailed {
                                cause: e.to_string(),
                            }));
                        }
                    }
                    Action::Exit(outcome) => {
                        self.report(&outcome);
                        return outcome;
                    }
                }
            }

            let event = if let Some(deadline) = disconnect_deadline {
                match tokio::time::timeout_at(deadline, self.transport.poll()).await {
                    Ok(polled) => self.translate(polled),
                    Err(_) => Some(ConnectionEvent::DisconnectFailed {
                        cause: "timed out".to_string(),
                    }),
                }
            } else {
                tokio::select! {
                    polled = self.transport.poll() => self.translate(polled),
                    _ = wait_shutdown(&mut shutdown), if !shutdown_requested => {
                        shutdown_requested = true;
                        Some(ConnectionEvent::DisconnectRequested)
                    }
                }
            };

            if let Some(event) = event {
                pending.extend(self.machine.handle(event));
            }
        }
    }

    fn translate(
        &self,
        polled: std::result::Result<TransportEvent, String>,
    ) -> Option<ConnectionEvent> {
        match polled {
            Ok(TransportEvent::ConnAck { session_present }) => {
                Some(ConnectionEvent::ConnectSucceeded { session_present })
            }
            Ok(TransportEvent::Message(message)) => {
                trace!(topic = %message.topic, bytes = message.payload.len(), "Inbound publish");
                Some(ConnectionEvent::MessageArrived(message))
            }
            Ok(TransportEvent::DeliveryComplete) => Some(ConnectionEvent::DeliveryComplete),
            Ok(TransportEvent::DisconnectSent) => Some(ConnectionEvent::DisconnectCompleted),
            Ok(TransportEvent::SubscribeRejected) => {
                error!(
                    topic = %self.machine.subscription().topic,
                    "Broker rejected the subscription"
                );
                None
            }
            Ok(TransportEvent::Other) => None,
            Err(cause) => Some(self.machine.classify_error(cause)),
        }
    }

    fn publish_status(&mut self, kind: StatusKind) {
        if let Some(status) = &self.status {
            if let Err(e) = status.publish(&mut self.transport, kind) {
                warn!(topic = %status.topic(), error = %e, "Failed to publish status");
            }
        }
    }

    fn report(&self, outcome: &SessionOutcome) {
        match outcome {
            SessionOutcome::Disconnected => info!("Disconnected from the MQTT server: OK"),
            SessionOutcome::DisconnectFailed { cause } => {
                error!(cause = %cause, "Disconnect failed")
            }
            SessionOutcome::RetriesExhausted { attempts } => {
                error!(attempts, "Unable to connect to the MQTT server")
            }
        }
    }
}

/// Resolve when shutdown is requested or the sender is gone.
async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ReconnectPolicy, Subscription};
    use crate::testing::{RecordingHandler, ScriptedTransport, TransportCall};
    use serialrelay_common::QoS;

    fn machine() -> ConnectionMachine {
        ConnectionMachine::new(
            Subscription::new("test", QoS::AtLeastOnce),
            ReconnectPolicy::default(),
        )
    }

    fn connack() -> std::result::Result<TransportEvent, String> {
        Ok(TransportEvent::ConnAck {
            session_present: false,
        })
    }

    fn refused() -> std::result::Result<TransportEvent, String> {
        Err("Connection refused".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_retry_bound() {
        let transport = ScriptedTransport::new((0..10).map(|_| refused()));
        let calls = transport.calls();
        let (_tx, rx) = watch::channel(false);

        let outcome = Supervisor::new(transport, RecordingHandler::default(), machine())
            .run(rx)
            .await;

        assert_eq!(outcome, SessionOutcome::RetriesExhausted { attempts: 6 });
        assert_eq!(outcome.exit_code(), 1);
        // Initial attempt plus five retries, nothing after.
        assert_eq!(calls.polls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_fixed() {
        let transport = ScriptedTransport::new([refused(), refused(), refused()]);
        let calls = transport.calls();
        let (_tx, rx) = watch::channel(false);

        let session = tokio::spawn(
            Supervisor::new(transport, RecordingHandler::default(), machine()).run(rx),
        );

        // Attempts at 0s, 2.5s, 5s and 7.5s.
        tokio::time::sleep(Duration::from_millis(7_400)).await;
        assert_eq!(calls.polls(), 3);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(calls.polls(), 4);
        session.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribes_after_connection_lost() {
        let transport = ScriptedTransport::new([
            connack(),
            Err("connection reset by peer".to_string()),
            refused(),
            connack(),
        ]);
        let calls = transport.calls();
        let (tx, rx) = watch::channel(false);

        let session = tokio::spawn(
            Supervisor::new(transport, RecordingHandler::default(), machine()).run(rx),
        );
        tokio::time::sleep(Duration::from_secs(10)).await;

        let subscribes: Vec<_> = calls
            .snapshot()
            .into_iter()
            .filter(|c| matches!(c, TransportCall::Subscribe { .. }))
            .collect();
        assert_eq!(
            subscribes,
            vec![
                TransportCall::Subscribe {
                    topic: "test".to_string(),
                    qos: QoS::AtLeastOnce
                };
                2
            ]
        );

        tx.send(true).unwrap();
        let outcome = session.await.unwrap();
        assert_eq!(outcome, SessionOutcome::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_reach_handler_in_order() {
        let transport = ScriptedTransport::new([
            connack(),
            Ok(TransportEvent::Message(InboundMessage::new("test", "1"))),
            Ok(TransportEvent::Other),
            Ok(TransportEvent::Message(InboundMessage::new("test", "0"))),
            Ok(TransportEvent::DeliveryComplete),
        ]);
        let handler = RecordingHandler::default();
        let seen = handler.messages();
        let (tx, rx) = watch::channel(false);

        let session = tokio::spawn(Supervisor::new(transport, handler, machine()).run(rx));
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();
        session.await.unwrap();

        let payloads: Vec<Vec<u8>> = seen.lock().unwrap().iter().map(|m| m.payload.clone()).collect();
        assert_eq!(payloads, vec![b"1".to_vec(), b"0".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_while_connected_disconnects_cleanly() {
        let transport = ScriptedTransport::new([connack()]);
        let calls = transport.calls();
        let (tx, rx) = watch::channel(false);

        let session = tokio::spawn(
            Supervisor::new(transport, RecordingHandler::default(), machine())
                .with_status(StatusPublisher::new("relay/status", "serial", "0.1.0"))
                .run(rx),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let outcome = session.await.unwrap();
        assert_eq!(outcome, SessionOutcome::Disconnected);
        assert_eq!(outcome.exit_code(), 0);

        let snapshot = calls.snapshot();
        let published: Vec<&str> = snapshot
            .iter()
            .filter_map(|c| match c {
                TransportCall::Publish { topic, .. } => Some(topic.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(published, vec!["relay/status", "relay/status"]);
        assert_eq!(snapshot.last(), Some(&TransportCall::Disconnect));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_while_reconnecting_fails() {
        let transport = ScriptedTransport::new([refused()]);
        let (tx, rx) = watch::channel(false);

        let session = tokio::spawn(
            Supervisor::new(transport, RecordingHandler::default(), machine()).run(rx),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let outcome = session.await.unwrap();
        assert!(matches!(outcome, SessionOutcome::DisconnectFailed { .. }));
        assert_eq!(outcome.exit_code(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_times_out() {
        let transport = ScriptedTransport::new([connack()]).with_disconnect_ack(false);
        let (tx, rx) = watch::channel(false);

        let session = tokio::spawn(
            Supervisor::new(transport, RecordingHandler::default(), machine())
                .with_disconnect_timeout(Duration::from_secs(1))
                .run(rx),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let outcome = session.await.unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::DisconnectFailed {
                cause: "timed out".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_disconnect_request_fails() {
        let transport = ScriptedTransport::new([connack()]).with_failing_disconnect();
        let (tx, rx) = watch::channel(false);

        let session = tokio::spawn(
            Supervisor::new(transport, RecordingHandler::default(), machine()).run(rx),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let outcome = session.await.unwrap();
        assert!(matches!(outcome, SessionOutcome::DisconnectFailed { .. }));
        assert!(!outcome.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_shutdown_sender_stops_session() {
        let transport = ScriptedTransport::new([connack()]);
        let (tx, rx) = watch::channel(false);

        let session = tokio::spawn(
            Supervisor::new(transport, RecordingHandler::default(), machine()).run(rx),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(tx);

        assert_eq!(session.await.unwrap(), SessionOutcome::Disconnected);
    }
}
