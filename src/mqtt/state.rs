use std::fmt;

/// Lifecycle state of a subscriber session.
///
/// ```text
/// Disconnected ──► Connecting ──► Connected ──► Subscribing ──► Subscribed
///       ▲              │              ▲              │              │
///       │              ▼              └──(rejected)──┘              │
///       │       ReconnectPending ◄──────────────────────────────────┘
///       └──────(transport lost)                     (transport lost)
///
/// any state ──stop()──► Closed
/// ```
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Subscribing,
    Subscribed,
    ReconnectPending,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Connected => "Connected",
            SessionState::Subscribing => "Subscribing",
            SessionState::Subscribed => "Subscribed",
            SessionState::ReconnectPending => "ReconnectPending",
            SessionState::Closed => "Closed",
        };
        write!(f, "{}", name)
    }
}
