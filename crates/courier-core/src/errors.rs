use std::time::Duration;

use crate::ids::ParticipantId;

/// Typed error taxonomy for the middleware core.
///
/// Every failure a caller can observe is one of these variants; unexpected
/// underlying failures are wrapped into `Internal` so the taxonomy stays
/// closed.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum MiddlewareError {
    #[error("no routing entry for participant {0}")]
    UnknownParticipant(ParticipantId),

    #[error("discovery did not complete within {timeout:?}")]
    ArbitrationTimeout { timeout: Duration },

    #[error("send buffer full")]
    SendBufferFull,

    #[error("message could not be sent: {0}")]
    MessageNotSent(String),

    #[error("message already expired: expiry {expiry_date_ms} <= now {now_ms}")]
    ExpiredMessage { expiry_date_ms: i64, now_ms: i64 },

    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("middleware error: {0}")]
    Internal(String),
}

impl MiddlewareError {
    /// Wrap an arbitrary failure into the catch-all variant.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::UnknownParticipant(_) => "unknown_participant",
            Self::ArbitrationTimeout { .. } => "arbitration_timeout",
            Self::SendBufferFull => "send_buffer_full",
            Self::MessageNotSent(_) => "message_not_sent",
            Self::ExpiredMessage { .. } => "expired_message",
            Self::InvalidTopic(_) => "invalid_topic",
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_wraps_display() {
        let err = MiddlewareError::internal("boom");
        assert_eq!(err, MiddlewareError::Internal("boom".into()));
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(MiddlewareError::SendBufferFull.error_kind(), "send_buffer_full");
        assert_eq!(
            MiddlewareError::ArbitrationTimeout {
                timeout: Duration::from_secs(30)
            }
            .error_kind(),
            "arbitration_timeout"
        );
        assert_eq!(
            MiddlewareError::UnknownParticipant(ParticipantId::from_raw("p")).error_kind(),
            "unknown_participant"
        );
    }

    #[test]
    fn expired_message_display_carries_timestamps() {
        let err = MiddlewareError::ExpiredMessage {
            expiry_date_ms: 100,
            now_ms: 200,
        };
        let text = err.to_string();
        assert!(text.contains("100"));
        assert!(text.contains("200"));
    }
}
