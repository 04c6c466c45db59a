//! Bus transport abstraction and its MQTT implementation.

use std::borrow::Cow;
use std::future::Future;

use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, SubscribeReasonCode};
use serialrelay_common::QoS;
use tracing::{debug, trace, warn};

use crate::error::{BridgeError, Result};

/// A message delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload rendered for logs; invalid UTF-8 is replaced.
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// What a poll of the transport produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker accepted the connection.
    ConnAck { session_present: bool },
    /// A publication arrived.
    Message(InboundMessage),
    /// One of our publications was acknowledged.
    DeliveryComplete,
    /// The broker refused a subscription.
    SubscribeRejected,
    /// The disconnect packet was written.
    DisconnectSent,
    /// Protocol traffic with no bearing on the session (pings, acks).
    Other,
}

/// The bus client as seen by the session supervisor.
///
/// `poll` drives the connection: after an error, the next call is a new
/// connect attempt. The request methods only enqueue work and never wait on
/// the network, so they are safe to call between polls.
pub trait BusTransport: Send {
    /// Wait for the next transport event. An `Err` carries the failure cause.
    fn poll(&mut self) -> impl Future<Output = std::result::Result<TransportEvent, String>> + Send;

    /// Request a subscription.
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<()>;

    /// Request a publication.
    fn publish(&mut self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<()>;

    /// Request a graceful disconnect.
    fn disconnect(&mut self) -> Result<()>;
}

/// [`BusTransport`] over a `rumqttc` client and event loop.
pub struct MqttTransport {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttTransport {
    pub fn new(client: AsyncClient, eventloop: EventLoop) -> Self {
        Self { client, eventloop }
    }

    /// Create the client from configuration; no connection is made until polled.
    pub fn from_config(
        config: &serialrelay_common::MqttConfig,
        last_will: Option<rumqttc::LastWill>,
    ) -> Result<Self> {
        let (client, eventloop) = serialrelay_common::connect(config, last_will)?;
        Ok(Self::new(client, eventloop))
    }
}

impl BusTransport for MqttTransport {
    async fn poll(&mut self) -> std::result::Result<TransportEvent, String> {
        let event = self.eventloop.poll().await.map_err(|e| e.to_string())?;
        trace!(?event, "MQTT event");

        let mapped = match event {
            Event::Incoming(Packet::ConnAck(ack)) => TransportEvent::ConnAck {
                session_present: ack.session_present,
            },
            Event::Incoming(Packet::Publish(publish)) => TransportEvent::Message(
                InboundMessage::new(publish.topic, publish.payload.to_vec()),
            ),
            Event::Incoming(Packet::PubAck(_)) | Event::Incoming(Packet::PubComp(_)) => {
                TransportEvent::DeliveryComplete
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    TransportEvent::SubscribeRejected
                } else {
                    debug!(pkid = ack.pkid, codes = ?ack.return_codes, "Subscription acknowledged");
                    TransportEvent::Other
                }
            }
            Event::Outgoing(Outgoing::Disconnect) => TransportEvent::DisconnectSent,
            _ => TransportEvent::Other,
        };

        Ok(mapped)
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<()> {
        self.client.try_subscribe(topic, qos.into())?;
        Ok(())
    }

    fn publish(&mut self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<()> {
        self.client
            .try_publish(topic, qos.into(), retain, payload)
            .map_err(|e| {
                warn!(topic = %topic, error = %e, "Failed to queue publication");
                BridgeError::from(e)
            })
    }

    fn disconnect(&mut self) -> Result<()> {
        self.client.try_disconnect()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Read one MQTT control packet, returning its first header byte and body.
    async fn read_packet(stream: &mut TcpStream) -> (u8, Vec<u8>) {
        let header = stream.read_u8().await.unwrap();

        let mut remaining = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await.unwrap();
            remaining |= usize::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }

        let mut body = vec![0; remaining];
        stream.read_exact(&mut body).await.unwrap();
        (header, body)
    }

    /// Minimal broker: accepts one client, resumes its session, rejects its
    /// subscription, then delivers one publication. Returns the header of the
    /// last packet the client sent.
    async fn serve_one_client(listener: TcpListener) -> u8 {
        let (mut stream, _) = listener.accept().await.unwrap();

        let (connect, _) = read_packet(&mut stream).await;
        assert_eq!(connect >> 4, 1, "expected CONNECT");
        // CONNACK, session present, accepted.
        stream.write_all(&[0x20, 0x02, 0x01, 0x00]).await.unwrap();

        let (subscribe, body) = read_packet(&mut stream).await;
        assert_eq!(subscribe, 0x82, "expected SUBSCRIBE");
        // SUBACK for the same packet id with a failure return code.
        stream
            .write_all(&[0x90, 0x03, body[0], body[1], 0x80])
            .await
            .unwrap();

        // QoS 0 PUBLISH of "1" on "test".
        stream
            .write_all(&[0x30, 0x07, 0x00, 0x04, b't', b'e', b's', b't', b'1'])
            .await
            .unwrap();

        let (last, _) = read_packet(&mut stream).await;
        last
    }

    async fn next_event(transport: &mut MqttTransport) -> TransportEvent {
        loop {
            let polled = tokio::time::timeout(Duration::from_secs(5), transport.poll())
                .await
                .expect("transport event in time")
                .expect("transport poll succeeds");
            if polled != TransportEvent::Other {
                return polled;
            }
        }
    }

    #[test]
    fn test_payload_str_lossy() {
        let message = InboundMessage::new("test", vec![b'o', b'k', 0xFF]);
        assert_eq!(message.payload_str(), "ok\u{FFFD}");
    }

    #[tokio::test]
    async fn test_requests_queue_without_network() {
        let transport = MqttTransport::from_config(&Default::default(), None);
        let mut transport = transport.unwrap();

        assert!(transport.subscribe("test", QoS::AtLeastOnce).is_ok());
        assert!(
            transport
                .publish("relay/status", QoS::AtLeastOnce, true, b"{}".to_vec())
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_broker_traffic_maps_to_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = tokio::spawn(serve_one_client(listener));

        let config = serialrelay_common::MqttConfig {
            broker: format!("mqtt://127.0.0.1:{}", port),
            ..Default::default()
        };
        let mut transport = MqttTransport::from_config(&config, None).unwrap();
        transport.subscribe("test", QoS::AtLeastOnce).unwrap();

        assert_eq!(
            next_event(&mut transport).await,
            TransportEvent::ConnAck {
                session_present: true
            }
        );
        assert_eq!(
            next_event(&mut transport).await,
            TransportEvent::SubscribeRejected
        );
        assert_eq!(
            next_event(&mut transport).await,
            TransportEvent::Message(InboundMessage::new("test", "1"))
        );

        transport.disconnect().unwrap();
        assert_eq!(
            next_event(&mut transport).await,
            TransportEvent::DisconnectSent
        );

        let last = tokio::time::timeout(Duration::from_secs(5), broker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last, 0xE0, "expected DISCONNECT");
    }
}
