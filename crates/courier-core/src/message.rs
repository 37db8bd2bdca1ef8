use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ids::{MessageId, ParticipantId};

/// Current wall-clock time as epoch milliseconds. All expiry timestamps in
/// the runtime are absolute values produced by this clock.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Wire-level message classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Reply,
    OneWay,
    SubscriptionRequest,
    BroadcastSubscriptionRequest,
    SubscriptionPublication,
    SubscriptionStop,
}

impl MessageKind {
    /// Request-family kinds get stamped with a reply-to address before
    /// sending and count toward inbound admission control.
    pub fn is_request_kind(&self) -> bool {
        matches!(
            self,
            Self::Request | Self::SubscriptionRequest | Self::BroadcastSubscriptionRequest
        )
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Reply => "reply",
            Self::OneWay => "one_way",
            Self::SubscriptionRequest => "subscription_request",
            Self::BroadcastSubscriptionRequest => "broadcast_subscription_request",
            Self::SubscriptionPublication => "subscription_publication",
            Self::SubscriptionStop => "subscription_stop",
        }
    }
}

/// Per-message quality of service. The ttl yields the absolute expiry
/// timestamp at message creation time; the scheduler retries delivery until
/// that timestamp passes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessagingQos {
    pub ttl_ms: u64,
}

impl Default for MessagingQos {
    fn default() -> Self {
        Self { ttl_ms: 60_000 }
    }
}

impl MessagingQos {
    pub fn with_ttl_ms(ttl_ms: u64) -> Self {
        Self { ttl_ms }
    }
}

/// Message envelope carried between participants. The payload is already
/// encoded; this layer never looks inside it.
#[derive(Clone, Debug)]
pub struct Message {
    pub id: MessageId,
    pub kind: MessageKind,
    pub from: ParticipantId,
    pub to: ParticipantId,
    /// Absolute expiry in epoch ms. Delivery attempts stop once passed.
    pub expiry_date_ms: i64,
    /// Where responses should be routed. Stamped by the sender for
    /// request-family kinds only.
    pub reply_to: Option<Address>,
    pub payload: Bytes,
}

impl Message {
    pub fn new(
        kind: MessageKind,
        from: ParticipantId,
        to: ParticipantId,
        qos: &MessagingQos,
        payload: Bytes,
    ) -> Self {
        Self {
            id: MessageId::new(),
            kind,
            from,
            to,
            expiry_date_ms: now_ms() + qos.ttl_ms as i64,
            reply_to: None,
            payload,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry_date_ms <= now_ms
    }
}
