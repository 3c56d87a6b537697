//! Broker connection seam used by the session worker.
//!
//! The production implementation is
//! [`MqttTransport`](super::mqtt_handler::MqttTransport). Tests drive the
//! session with scripted implementations.

use std::future::Future;
use std::pin::Pin;

use rumqttc::QoS;

use super::config::SessionParams;
use super::error::TransportError;
use super::message_manager::InboundMessage;

pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// One broker connection at a time, opened and closed by the session worker.
///
/// The worker never calls `connect` while a previous `connect` or
/// `subscribe` is still pending.
pub trait Transport: Send + 'static {
    /// Opens a fresh connection and resolves once the broker acknowledged it
    fn connect<'a>(&'a mut self, params: &'a SessionParams) -> TransportFuture<'a, ()>;

    /// Resolves on SUBACK. A failure return code yields
    /// [`TransportError::SubscribeRejected`].
    fn subscribe<'a>(&'a mut self, topic: &'a str, qos: QoS) -> TransportFuture<'a, ()>;

    /// Next inbound publish in broker order. Fails once the connection is lost.
    fn next_message(&mut self) -> TransportFuture<'_, InboundMessage>;

    fn unsubscribe<'a>(&'a mut self, topic: &'a str) -> TransportFuture<'a, ()>;

    /// Sends DISCONNECT and releases the connection
    fn close(&mut self) -> TransportFuture<'_, ()>;
}

impl Transport for Box<dyn Transport> {
    fn connect<'a>(&'a mut self, params: &'a SessionParams) -> TransportFuture<'a, ()> {
        (**self).connect(params)
    }

    fn subscribe<'a>(&'a mut self, topic: &'a str, qos: QoS) -> TransportFuture<'a, ()> {
        (**self).subscribe(topic, qos)
    }

    fn next_message(&mut self) -> TransportFuture<'_, InboundMessage> {
        (**self).next_message()
    }

    fn unsubscribe<'a>(&'a mut self, topic: &'a str) -> TransportFuture<'a, ()> {
        (**self).unsubscribe(topic)
    }

    fn close(&mut self) -> TransportFuture<'_, ()> {
        (**self).close()
    }
}
