use std::collections::VecDeque;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Incoming, MqttOptions,
    Outgoing, QoS, SubscribeReasonCode,
};
use tracing::{debug, info, warn};

use super::config::SessionParams;
use super::error::TransportError;
use super::message_manager::InboundMessage;
use super::transport::{Transport, TransportFuture};

const DEFAULT_REQUEST_CAPACITY: usize = 10;
/// Largest remaining length an MQTT 3.1.1 packet can encode
pub const MAX_PACKET_SIZE: usize = 268_435_455;

struct Link {
    client: AsyncClient,
    eventloop: EventLoop,
}

/// [`Transport`] backed by a rumqttc client and event loop.
///
/// Every `connect` builds a fresh client with a clean session, so rumqttc's
/// own reconnect behaviour is never used; reconnect policy belongs to the
/// session worker.
pub struct MqttTransport {
    link: Option<Link>,
    // Publishes that arrived while waiting for an acknowledgement
    pending: VecDeque<InboundMessage>,
    request_capacity: usize,
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_CAPACITY)
    }
}

impl MqttTransport {
    pub fn new(request_capacity: usize) -> Self {
        MqttTransport {
            link: None,
            pending: VecDeque::new(),
            request_capacity: request_capacity.max(1),
        }
    }

    fn options(params: &SessionParams) -> MqttOptions {
        let mut mqtt_options = MqttOptions::new(
            params.client_id.clone(),
            params.broker.host.clone(),
            params.broker.port,
        );
        mqtt_options
            .set_keep_alive(params.keep_alive)
            .set_clean_session(true)
            .set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        mqtt_options
    }
}

fn to_message(publish: rumqttc::Publish) -> InboundMessage {
    InboundMessage::new(publish.topic, publish.payload.to_vec())
}

fn connection_error(e: ConnectionError) -> TransportError {
    match e {
        ConnectionError::ConnectionRefused(code) => TransportError::Refused(format!("{:?}", code)),
        other => TransportError::Connection(other.to_string()),
    }
}

impl Transport for MqttTransport {
    fn connect<'a>(&'a mut self, params: &'a SessionParams) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.link = None;
            self.pending.clear();

            info!(
                "Connecting to MQTT broker {} as {}",
                params.broker, params.client_id
            );
            let (client, mut eventloop) =
                AsyncClient::new(Self::options(params), self.request_capacity);

            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                        if ack.code != ConnectReturnCode::Success {
                            return Err(TransportError::Refused(format!("{:?}", ack.code)));
                        }
                        debug!("CONNACK received, session_present={}", ack.session_present);
                        break;
                    }
                    Ok(event) => debug!("Event before CONNACK: {:?}", event),
                    Err(e) => return Err(connection_error(e)),
                }
            }

            self.link = Some(Link { client, eventloop });
            Ok(())
        })
    }

    fn subscribe<'a>(&'a mut self, topic: &'a str, qos: QoS) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let result = {
                let link = self.link.as_mut().ok_or(TransportError::Closed)?;
                link.client
                    .subscribe(topic, qos)
                    .await
                    .map_err(|e| TransportError::Connection(e.to_string()))?;

                loop {
                    match link.eventloop.poll().await {
                        Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                            break match ack.return_codes.first() {
                                Some(SubscribeReasonCode::Success(granted)) => {
                                    debug!("SUBACK for {} granted {:?}", topic, granted);
                                    Ok(())
                                }
                                _ => Err(TransportError::SubscribeRejected(topic.to_string())),
                            };
                        }
                        Ok(Event::Incoming(Incoming::Publish(publish))) => {
                            self.pending.push_back(to_message(publish));
                        }
                        Ok(Event::Incoming(Incoming::Disconnect)) => {
                            break Err(TransportError::Connection(
                                "broker sent DISCONNECT".to_string(),
                            ));
                        }
                        Ok(_) => {}
                        Err(e) => break Err(connection_error(e)),
                    }
                }
            };

            if matches!(result, Err(TransportError::Connection(_))) {
                self.link = None;
            }
            result
        })
    }

    fn next_message(&mut self) -> TransportFuture<'_, InboundMessage> {
        Box::pin(async move {
            if let Some(message) = self.pending.pop_front() {
                return Ok(message);
            }

            let result = {
                let link = self.link.as_mut().ok_or(TransportError::Closed)?;
                loop {
                    match link.eventloop.poll().await {
                        Ok(Event::Incoming(Incoming::Publish(publish))) => {
                            break Ok(to_message(publish));
                        }
                        Ok(Event::Incoming(Incoming::Disconnect)) => {
                            break Err(TransportError::Connection(
                                "broker sent DISCONNECT".to_string(),
                            ));
                        }
                        Ok(_) => {}
                        Err(e) => break Err(connection_error(e)),
                    }
                }
            };

            if result.is_err() {
                self.link = None;
            }
            result
        })
    }

    fn unsubscribe<'a>(&'a mut self, topic: &'a str) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let link = self.link.as_mut().ok_or(TransportError::Closed)?;
            link.client
                .unsubscribe(topic)
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))?;

            loop {
                match link.eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::UnsubAck(_))) => {
                        debug!("UNSUBACK for {}", topic);
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(e) => return Err(connection_error(e)),
                }
            }
        })
    }

    fn close(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.pending.clear();
            let Some(mut link) = self.link.take() else {
                return Ok(());
            };

            if let Err(e) = link.client.disconnect().await {
                warn!("Failed to queue DISCONNECT: {}", e);
                return Err(TransportError::Connection(e.to_string()));
            }

            loop {
                match link.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        info!("DISCONNECT sent to broker");
                        return Ok(());
                    }
                    Ok(_) => {}
                    // The broker closing the socket first is a clean end as well
                    Err(e) => {
                        debug!("Event loop ended during close: {}", e);
                        return Ok(());
                    }
                }
            }
        })
    }
}
