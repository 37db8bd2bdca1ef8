use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport-level address of a participant endpoint.
///
/// Opaque to everything except the transport that produced it; the routing
/// table stores and hands these out, the send scheduler passes them to the
/// transport unchanged.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Address {
    /// Broker-based pub/sub endpoint, reached by publishing to a topic.
    Broker { topic: String },
    /// Direct socket endpoint.
    Socket { host: String, port: u16 },
}

impl Address {
    pub fn broker(topic: impl Into<String>) -> Self {
        Self::Broker { topic: topic.into() }
    }

    pub fn socket(host: impl Into<String>, port: u16) -> Self {
        Self::Socket {
            host: host.into(),
            port,
        }
    }

    /// Topic fragment for broker addresses; `None` for socket endpoints.
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::Broker { topic } => Some(topic),
            Self::Socket { .. } => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broker { topic } => write!(f, "broker:{topic}"),
            Self::Socket { host, port } => write!(f, "socket:{host}:{port}"),
        }
    }
}
