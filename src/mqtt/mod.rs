//! # MQTT Subscriber Session
//!
//! Keeps one subscription to one broker topic alive and hands every received
//! payload to a sink, reconnecting with exponential backoff when the broker
//! goes away.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Connection settings, URI parsing, validation
//! ├── topic.rs            - Topic filter validation and wildcard matching
//! ├── state.rs            - Observable session state
//! ├── backoff.rs          - Doubling, capped reconnect delay
//! ├── error.rs            - Error kinds and error types
//! ├── sink.rs             - Callback interface for session observers
//! ├── message_manager.rs  - Inbound messages and channel based sink
//! ├── transport.rs        - Broker connection seam
//! ├── mqtt_handler.rs     - rumqttc implementation of the transport
//! └── session.rs          - Session manager and its worker task
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! Broker ──► Transport ──► SessionWorker ──► DispatchGate ──► SessionSink
//!                              │                  │
//!                          Backoff            watch<SessionState>
//! ```
//!
//! Failures never disappear silently: connect failures and transport loss
//! are reported to the sink and followed by a reconnect, a rejected
//! subscription is reported and leaves the session connected.

pub mod backoff;
pub mod config;
pub mod error;
pub mod message_manager;
pub mod mqtt_handler;
pub mod session;
pub mod sink;
pub mod state;
pub mod topic;
pub mod transport;


pub use backoff::Backoff;
pub use config::{BrokerAddress, ConnectionConfig, ReconnectConfig, SessionParams};
pub use error::{ConfigError, ErrorKind, SessionError, TransportError};
pub use message_manager::{ChannelSink, InboundMessage, SessionEvent};
pub use mqtt_handler::MqttTransport;
pub use session::SessionManager;
pub use sink::SessionSink;
pub use state::SessionState;
pub use transport::{Transport, TransportFuture};
