use async_trait::async_trait;

use crate::address::Address;
use crate::message::Message;

/// Transport send failure, classified for the retry loop.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Worth retrying while the message ttl allows.
    #[error("transient transport failure: {0}")]
    Transient(String),
    /// No amount of retrying will help; abandon immediately.
    #[error("fatal transport failure: {0}")]
    Fatal(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Outbound transport collaborator. Connection setup, encoding and broker
/// handshakes live behind this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, address: &Address, message: &Message) -> Result<(), TransportError>;
}

/// Inbound side of a shared transport connection: topic subscription plus
/// the intake pause/resume primitives admission control drives.
#[async_trait]
pub trait InboundTransport: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    /// Suspend delivery of new inbound messages on the shared subscription.
    fn pause_intake(&self);

    /// Resume delivery after a pause.
    fn resume_intake(&self);
}
