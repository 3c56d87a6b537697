use std::fmt;
use std::time::Duration;

use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ConfigError;
use super::topic;

pub const DEFAULT_PORT: u16 = 1883;
pub const CLIENT_ID_PREFIX: &str = "topicwatch";

/// Raw connection settings as supplied by the caller or the settings file.
///
/// Nothing is checked until [`ConnectionConfig::validate`] turns it into
/// [`SessionParams`], which is what a running session works with.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// `tcp://host:port`, `mqtt://host:port` or plain `host[:port]`
    pub broker_uri: String,
    /// Generated as `topicwatch_<uuid>` when absent or empty
    pub client_id: Option<String>,
    pub topic: String,
    pub keep_alive_secs: u16,
    pub reconnect: ReconnectConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            broker_uri: String::new(),
            client_id: None,
            topic: String::new(),
            keep_alive_secs: 60,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Reconnect and shutdown timing
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// First backoff delay, also used again after every successful connect
    pub min_delay_ms: u64,
    /// Cap for the doubling backoff delay
    pub max_delay_ms: u64,
    /// Upper bound for a single connect attempt
    pub connect_timeout_ms: u64,
    /// Time allowed for unsubscribe and disconnect before the transport is dropped
    pub shutdown_grace_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 500,
            max_delay_ms: 30_000,
            connect_timeout_ms: 10_000,
            shutdown_grace_ms: 2_000,
        }
    }
}

/// Host and port of the broker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Validated, immutable parameters of one session
#[derive(Clone, Debug, PartialEq)]
pub struct SessionParams {
    pub broker_uri: String,
    pub broker: BrokerAddress,
    pub client_id: String,
    pub topic: String,
    /// Always at-most-once
    pub qos: QoS,
    pub keep_alive: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub connect_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl ConnectionConfig {
    pub fn new(broker_uri: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            broker_uri: broker_uri.into(),
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Checks broker URI, topic and timing and resolves the client id
    pub fn validate(&self) -> Result<SessionParams, ConfigError> {
        let broker = parse_broker_uri(&self.broker_uri)?;
        topic::validate_filter(&self.topic)?;

        let reconnect = &self.reconnect;
        if reconnect.min_delay_ms == 0 {
            return Err(ConfigError::InvalidReconnectPolicy(
                "min_delay_ms must be greater than zero".to_string(),
            ));
        }
        if reconnect.max_delay_ms < reconnect.min_delay_ms {
            return Err(ConfigError::InvalidReconnectPolicy(format!(
                "max_delay_ms ({}) is below min_delay_ms ({})",
                reconnect.max_delay_ms, reconnect.min_delay_ms
            )));
        }
        if reconnect.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidReconnectPolicy(
                "connect_timeout_ms must be greater than zero".to_string(),
            ));
        }

        let client_id = match self.client_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generate_client_id(),
        };

        Ok(SessionParams {
            broker_uri: self.broker_uri.trim().to_string(),
            broker,
            client_id,
            topic: self.topic.clone(),
            qos: QoS::AtMostOnce,
            keep_alive: Duration::from_secs(u64::from(self.keep_alive_secs)),
            backoff_min: Duration::from_millis(reconnect.min_delay_ms),
            backoff_max: Duration::from_millis(reconnect.max_delay_ms),
            connect_timeout: Duration::from_millis(reconnect.connect_timeout_ms),
            shutdown_grace: Duration::from_millis(reconnect.shutdown_grace_ms),
        })
    }
}

/// Unique per session: `topicwatch_` and 12 random hex digits
pub fn generate_client_id() -> String {
    // 23 characters, the longest id every 3.1.1 broker must accept
    let id = Uuid::new_v4().simple().to_string();
    format!("{}_{}", CLIENT_ID_PREFIX, &id[..12])
}

/// Parses `tcp://host:port`, `mqtt://host:port` or `host[:port]`.
///
/// IPv6 literals must be bracketed, `tcp://[::1]:1883`. Credentials in the
/// authority are rejected since the session never authenticates.
pub fn parse_broker_uri(uri: &str) -> Result<BrokerAddress, ConfigError> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(ConfigError::EmptyBrokerUri);
    }

    let authority = match uri.split_once("://") {
        Some((scheme, rest)) => {
            let scheme = scheme.to_ascii_lowercase();
            if scheme != "tcp" && scheme != "mqtt" {
                return Err(ConfigError::UnsupportedScheme(scheme));
            }
            rest
        }
        None => uri,
    };
    let authority = authority.trim_end_matches('/');

    let invalid_host = |reason: &str| ConfigError::InvalidHost {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };
    if authority.contains('@') {
        return Err(invalid_host("user credentials are not supported"));
    }
    if authority.contains('/') {
        return Err(invalid_host("unexpected path after the host"));
    }

    let (host, port) = match authority.strip_prefix('[') {
        Some(bracketed) => {
            let (host, rest) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid_host("unterminated IPv6 literal"))?;
            let port = match rest {
                "" => DEFAULT_PORT,
                _ => match rest.strip_prefix(':') {
                    Some(port) => parse_port(uri, port)?,
                    None => return Err(invalid_host("unexpected text after IPv6 literal")),
                },
            };
            (host, port)
        }
        None => match authority.rsplit_once(':') {
            Some((host, port)) => {
                if host.contains(':') {
                    return Err(invalid_host("IPv6 literals must be enclosed in brackets"));
                }
                (host, parse_port(uri, port)?)
            }
            None => (authority, DEFAULT_PORT),
        },
    };

    if host.is_empty() {
        return Err(ConfigError::MissingHost(uri.to_string()));
    }
    if host.chars().any(char::is_whitespace) {
        return Err(invalid_host("whitespace in host"));
    }
    if port == 0 {
        return Err(ConfigError::InvalidPort {
            uri: uri.to_string(),
            reason: "port 0 is not connectable".to_string(),
        });
    }

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
    })
}

fn parse_port(uri: &str, port: &str) -> Result<u16, ConfigError> {
    port.parse::<u16>().map_err(|e| ConfigError::InvalidPort {
        uri: uri.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_uri() {
        let addr = parse_broker_uri("tcp://10.0.0.5:1883").unwrap();
        assert_eq!(addr.host, "10.0.0.5");
        assert_eq!(addr.port, 1883);
        assert_eq!(addr.to_string(), "10.0.0.5:1883");
    }

    #[test]
    fn defaults_port_and_accepts_bare_host() {
        assert_eq!(
            parse_broker_uri("mqtt://broker.local").unwrap(),
            BrokerAddress {
                host: "broker.local".into(),
                port: DEFAULT_PORT
            }
        );
        assert_eq!(parse_broker_uri("localhost:1884").unwrap().port, 1884);
        assert_eq!(parse_broker_uri("tcp://host:1883/").unwrap().host, "host");
    }

    #[test]
    fn rejects_malformed_uris() {
        assert_eq!(parse_broker_uri("  "), Err(ConfigError::EmptyBrokerUri));
        assert_eq!(
            parse_broker_uri("ssl://broker:8883"),
            Err(ConfigError::UnsupportedScheme("ssl".into()))
        );
        assert!(matches!(
            parse_broker_uri("tcp://:1883"),
            Err(ConfigError::MissingHost(_))
        ));
        assert!(matches!(
            parse_broker_uri("tcp://broker:port"),
            Err(ConfigError::InvalidPort { .. })
        ));
        assert!(matches!(
            parse_broker_uri("tcp://broker:0"),
            Err(ConfigError::InvalidPort { .. })
        ));
    }

    #[test]
    fn accepts_bracketed_ipv6() {
        assert_eq!(
            parse_broker_uri("tcp://[::1]:1884").unwrap(),
            BrokerAddress {
                host: "::1".into(),
                port: 1884
            }
        );
        assert_eq!(parse_broker_uri("[fe80::2]").unwrap().port, DEFAULT_PORT);
        assert_eq!(
            parse_broker_uri("tcp://[::1]:1884").unwrap().to_string(),
            "[::1]:1884"
        );
    }

    #[test]
    fn rejects_hosts_that_never_connect() {
        for uri in [
            "tcp://user:pw@broker.local",
            "tcp://user@broker.local:1883",
            "tcp://::1:1883",
            "tcp://[::1",
            "tcp://[::1]x",
            "tcp://broker.local/path",
            "tcp://bro ker:1883",
        ] {
            assert!(
                matches!(parse_broker_uri(uri), Err(ConfigError::InvalidHost { .. })),
                "{} should be rejected",
                uri
            );
        }
    }

    #[test]
    fn validate_rejects_credentials_in_uri() {
        let config = ConnectionConfig::new("tcp://user:pw@10.0.0.5:1883", "visitor/count");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHost { .. })
        ));
    }

    #[test]
    fn validate_resolves_params() {
        let params = ConnectionConfig::new("tcp://10.0.0.5:1883", "visitor/count")
            .with_client_id("display-1")
            .validate()
            .unwrap();
        assert_eq!(params.client_id, "display-1");
        assert_eq!(params.topic, "visitor/count");
        assert_eq!(params.qos, QoS::AtMostOnce);
        assert_eq!(params.keep_alive, Duration::from_secs(60));
        assert_eq!(params.backoff_min, Duration::from_millis(500));
        assert_eq!(params.backoff_max, Duration::from_secs(30));
    }

    #[test]
    fn generates_unique_client_ids() {
        let config = ConnectionConfig::new("tcp://10.0.0.5:1883", "visitor/count");
        let a = config.validate().unwrap().client_id;
        let b = config.validate().unwrap().client_id;
        assert!(a.starts_with("topicwatch_"));
        assert_ne!(a, b);

        let blank = config.clone().with_client_id("   ");
        let generated = blank.validate().unwrap().client_id;
        assert!(generated.starts_with("topicwatch_"));
        assert_eq!(generated.len(), 23);
    }

    #[test]
    fn empty_topic_is_rejected() {
        let config = ConnectionConfig::new("tcp://10.0.0.5:1883", "");
        assert_eq!(config.validate(), Err(ConfigError::EmptyTopic));
    }

    #[test]
    fn rejects_inverted_backoff() {
        let config = ConnectionConfig::new("tcp://10.0.0.5:1883", "visitor/count").with_reconnect(
            ReconnectConfig {
                min_delay_ms: 1_000,
                max_delay_ms: 10,
                ..Default::default()
            },
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidReconnectPolicy(_))
        ));
    }
}
