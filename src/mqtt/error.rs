//! Error definitions for the subscriber session

use std::fmt;
use thiserror::Error;

/// Category of a failure reported through [`SessionSink::on_error`].
///
/// [`SessionSink::on_error`]: super::sink::SessionSink::on_error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Broker URI or topic is malformed. The session never starts.
    ConfigError,
    /// Transport could not be established. Triggers reconnect with backoff.
    ConnectError,
    /// Broker rejected the subscription. No automatic retry.
    SubscribeError,
    /// Established connection dropped. Triggers reconnect with backoff.
    TransportLost,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ConfigError => write!(f, "ConfigError"),
            ErrorKind::ConnectError => write!(f, "ConnectError"),
            ErrorKind::SubscribeError => write!(f, "SubscribeError"),
            ErrorKind::TransportLost => write!(f, "TransportLost"),
        }
    }
}

/// Validation failures for a [`ConnectionConfig`](super::config::ConnectionConfig)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("broker URI is empty")]
    EmptyBrokerUri,

    #[error("unsupported broker URI scheme: {0}")]
    UnsupportedScheme(String),

    #[error("broker URI has no host: {0}")]
    MissingHost(String),

    #[error("invalid broker host in {uri}: {reason}")]
    InvalidHost { uri: String, reason: String },

    #[error("invalid broker port in {uri}: {reason}")]
    InvalidPort { uri: String, reason: String },

    #[error("topic is empty")]
    EmptyTopic,

    #[error("invalid topic filter {topic}: {reason}")]
    InvalidTopic { topic: String, reason: String },

    #[error("invalid reconnect policy: {0}")]
    InvalidReconnectPolicy(String),
}

/// Errors returned synchronously when starting a session.
///
/// See [`SessionManager::start`](super::session::SessionManager::start).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("no tokio runtime available to run the session worker")]
    NoRuntime,
}

/// Failures produced by a [`Transport`](super::transport::Transport)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Network level failure while connecting or while connected
    #[error("connection error: {0}")]
    Connection(String),

    /// Broker answered CONNACK with a non-success return code
    #[error("connection refused by broker: {0}")]
    Refused(String),

    /// Broker answered SUBACK with a failure return code
    #[error("subscription rejected: {0}")]
    SubscribeRejected(String),

    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    /// Operation attempted without an open connection
    #[error("transport is closed")]
    Closed,
}

impl TransportError {
    /// Maps the failure to the kind reported to the sink, given whether the
    /// connection had been established when it happened.
    pub fn kind(&self, established: bool) -> ErrorKind {
        match self {
            TransportError::SubscribeRejected(_) => ErrorKind::SubscribeError,
            TransportError::Refused(_) => ErrorKind::ConnectError,
            _ if established => ErrorKind::TransportLost,
            _ => ErrorKind::ConnectError,
        }
    }
}
