//! topicwatch: a resilient single-topic MQTT subscriber.
//!
//! [`mqtt::SessionManager`] connects to a broker, subscribes to one topic at
//! QoS 0 and forwards every payload to a [`mqtt::SessionSink`]. Lost
//! connections are re-established with exponential backoff. [`config`]
//! loads the settings file used by the `topicwatch` binary.

pub mod config;
pub mod mqtt;
