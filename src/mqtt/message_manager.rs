use chrono::{DateTime, Local};
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::error::ErrorKind;
use super::sink::SessionSink;
use super::state::SessionState;

/// A message received on the subscribed topic.
///
/// Transient: handed to the sink once and then dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Local>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Local::now(),
        }
    }

    /// Payload decoded as UTF-8, invalid sequences replaced
    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// `<label>: <payload>`, the line shown by a text display
    pub fn render(&self, label: &str) -> String {
        format!("{}: {}", label, self.payload_text())
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = self.payload_text();
        let preview: String = text.chars().take(32).collect();
        write!(
            f,
            "{} - {} - {}",
            self.received_at.format("%H:%M:%S%.3f"),
            self.topic,
            preview
        )
    }
}

/// Everything a [`ChannelSink`] forwards
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Message(InboundMessage),
    StateChanged(SessionState),
    Error { kind: ErrorKind, detail: String },
    ReconnectScheduled { attempt: u32, delay: Duration },
}

/// Sink that forwards every callback into an unbounded channel.
///
/// The channel keeps order and never drops, so a consumer on another task or
/// thread sees exactly what the session dispatched.
pub struct ChannelSink {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (ChannelSink { events }, rx)
    }

    fn forward(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Session event receiver dropped, discarding event");
        }
    }
}

impl SessionSink for ChannelSink {
    fn on_message(&mut self, message: &InboundMessage) {
        self.forward(SessionEvent::Message(message.clone()));
    }

    fn on_state_change(&mut self, state: SessionState) {
        self.forward(SessionEvent::StateChanged(state));
    }

    fn on_error(&mut self, kind: ErrorKind, detail: &str) {
        self.forward(SessionEvent::Error {
            kind,
            detail: detail.to_string(),
        });
    }

    fn on_reconnect_scheduled(&mut self, attempt: u32, delay: Duration) {
        self.forward(SessionEvent::ReconnectScheduled { attempt, delay });
    }
}
