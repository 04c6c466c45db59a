//! In-memory transport and handler for exercising bridges without a broker.
//!
//! Enabled for this crate's own tests and, for dependents, through the
//! `testing` feature.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serialrelay_common::QoS;

use crate::error::{BridgeError, Result};
use crate::supervisor::MessageHandler;
use crate::transport::{BusTransport, InboundMessage, TransportEvent};

/// A request the supervisor made of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Subscribe { topic: String, qos: QoS },
    Publish { topic: String, qos: QoS, retain: bool, payload: Vec<u8> },
    Disconnect,
}

/// Shared view of what a [`ScriptedTransport`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<TransportCall>>>,
    polls: Arc<AtomicUsize>,
}

impl CallLog {
    /// Requests recorded so far, in order.
    pub fn snapshot(&self) -> Vec<TransportCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of times `poll` was entered.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    fn record(&self, call: TransportCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

/// Transport replaying a fixed script of poll results.
///
/// Once the script runs dry, `poll` never resolves. A disconnect request
/// queues [`TransportEvent::DisconnectSent`] unless disabled.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: VecDeque<std::result::Result<TransportEvent, String>>,
    log: CallLog,
    ack_disconnect: bool,
    fail_disconnect: bool,
}

impl ScriptedTransport {
    pub fn new(
        script: impl IntoIterator<Item = std::result::Result<TransportEvent, String>>,
    ) -> Self {
        Self {
            script: script.into_iter().collect(),
            log: CallLog::default(),
            ack_disconnect: true,
            fail_disconnect: false,
        }
    }

    /// Whether a disconnect request is answered with `DisconnectSent`.
    pub fn with_disconnect_ack(mut self, ack: bool) -> Self {
        self.ack_disconnect = ack;
        self
    }

    /// Make the disconnect request itself fail.
    pub fn with_failing_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    /// Handle for inspecting calls after the transport moves into a supervisor.
    pub fn calls(&self) -> CallLog {
        self.log.clone()
    }
}

impl BusTransport for ScriptedTransport {
    async fn poll(&mut self) -> std::result::Result<TransportEvent, String> {
        self.log.polls.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(next) => next,
            None => std::future::pending().await,
        }
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<()> {
        self.log.record(TransportCall::Subscribe {
            topic: topic.to_string(),
            qos,
        });
        Ok(())
    }

    fn publish(&mut self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<()> {
        self.log.record(TransportCall::Publish {
            topic: topic.to_string(),
            qos,
            retain,
            payload,
        });
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.log.record(TransportCall::Disconnect);
        if self.fail_disconnect {
            return Err(BridgeError::transport("request queue closed"));
        }
        if self.ack_disconnect {
            self.script.push_front(Ok(TransportEvent::DisconnectSent));
        }
        Ok(())
    }
}

/// Handler that stores every message it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    messages: Arc<Mutex<Vec<InboundMessage>>>,
}

impl RecordingHandler {
    pub fn messages(&self) -> Arc<Mutex<Vec<InboundMessage>>> {
        Arc::clone(&self.messages)
    }
}

impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: InboundMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }
}
