//! Routes inbound bus messages to the command dispatcher.

use serialrelay_bridge_framework::{InboundMessage, MessageHandler};
use tracing::{debug, info};

use crate::device::SerialDevice;
use crate::dispatcher::{CommandDispatcher, DispatchOutcome};

/// Forwards each message payload to the dispatcher and waits for the
/// transaction to finish before the next message is taken.
pub struct MessageRouter<D> {
    dispatcher: CommandDispatcher<D>,
}

impl<D: SerialDevice> MessageRouter<D> {
    pub fn new(dispatcher: CommandDispatcher<D>) -> Self {
        Self { dispatcher }
    }

    /// Route one message, returning what the dispatcher did with it.
    pub async fn route(&self, message: &InboundMessage) -> DispatchOutcome {
        info!(
            topic = %message.topic,
            payload = %message.payload_str(),
            "Message arrived"
        );

        let outcome = self.dispatcher.dispatch(&message.payload).await;
        debug!(topic = %message.topic, outcome = ?outcome, "Message handled");
        outcome
    }
}

impl<D: SerialDevice> MessageHandler for MessageRouter<D> {
    async fn handle(&self, message: InboundMessage) {
        self.route(&message).await;
    }
}
