use std::time::Duration;

use super::error::ErrorKind;
use super::message_manager::InboundMessage;
use super::state::SessionState;

/// Receiver of everything a session observes.
///
/// All methods run on the session's worker task while the dispatch gate is
/// held. They must not block for long and must not call
/// [`SessionManager::stop`](super::session::SessionManager::stop) on the
/// same session, since the gate is not re-entrant. Callers that need a
/// particular thread (a UI thread for example) re-dispatch from here, see
/// [`ChannelSink`](super::message_manager::ChannelSink).
pub trait SessionSink: Send + 'static {
    /// One call per received message, in arrival order
    fn on_message(&mut self, message: &InboundMessage);

    fn on_state_change(&mut self, state: SessionState);

    fn on_error(&mut self, kind: ErrorKind, detail: &str);

    /// A reconnect attempt will start after `delay`
    fn on_reconnect_scheduled(&mut self, _attempt: u32, _delay: Duration) {}
}

impl SessionSink for Box<dyn SessionSink> {
    fn on_message(&mut self, message: &InboundMessage) {
        (**self).on_message(message)
    }

    fn on_state_change(&mut self, state: SessionState) {
        (**self).on_state_change(state)
    }

    fn on_error(&mut self, kind: ErrorKind, detail: &str) {
        (**self).on_error(kind, detail)
    }

    fn on_reconnect_scheduled(&mut self, attempt: u32, delay: Duration) {
        (**self).on_reconnect_scheduled(attempt, delay)
    }
}
