use std::sync::Arc;
use std::time::Duration;

use tracing::{error, trace};

use courier_core::{now_ms, Address, Message, MiddlewareError, ResultFuture, Transport};
use courier_routing::RoutingTable;

use crate::scheduler::{MessageJob, SchedulerConfig, SendScheduler};

/// Fronts the send scheduler: resolves the destination through the routing
/// table, stamps the local reply-to address onto request-family messages so
/// responses can route back, and owns scheduler shutdown.
pub struct MessageSender {
    scheduler: SendScheduler,
    routing: Arc<RoutingTable>,
    reply_to: Address,
}

impl MessageSender {
    pub fn new(
        transport: Arc<dyn Transport>,
        routing: Arc<RoutingTable>,
        reply_to: Address,
        config: SchedulerConfig,
    ) -> Result<Self, MiddlewareError> {
        Ok(Self {
            scheduler: SendScheduler::new(transport, config)?,
            routing,
            reply_to,
        })
    }

    /// Resolve the recipient and hand the message to the scheduler.
    pub fn send(&self, message: Message) -> Result<(), MiddlewareError> {
        let (job, _) = self.prepare(message)?;
        self.scheduler.schedule(job, Duration::ZERO)
    }

    /// Like [`send`](Self::send), but the returned future reports the
    /// terminal delivery outcome.
    pub fn send_tracked(&self, message: Message) -> Result<ResultFuture<()>, MiddlewareError> {
        let (job, future) = self.prepare(message)?;
        self.scheduler.schedule(job, Duration::ZERO)?;
        Ok(future)
    }

    fn prepare(
        &self,
        mut message: Message,
    ) -> Result<(MessageJob, ResultFuture<()>), MiddlewareError> {
        let address = self.routing.get(&message.to)?;

        if message.kind.is_request_kind() {
            message.reply_to = Some(self.reply_to.clone());
        }

        let now = now_ms();
        if message.is_expired(now) {
            error!(
                message_id = %message.id,
                expiry_date_ms = message.expiry_date_ms,
                now_ms = now,
                "refusing to schedule already-expired message"
            );
            return Err(MiddlewareError::ExpiredMessage {
                expiry_date_ms: message.expiry_date_ms,
                now_ms: now,
            });
        }

        trace!(
            message_id = %message.id,
            kind = message.kind.kind_str(),
            to = %message.to,
            "scheduling send"
        );
        Ok(MessageJob::tracked(address, message))
    }

    pub fn reply_to(&self) -> &Address {
        &self.reply_to
    }

    pub fn total_retries(&self) -> u64 {
        self.scheduler.total_retries()
    }

    /// Shut the scheduler down. Always completes; internal failures are
    /// logged by the scheduler and swallowed here.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use bytes::Bytes;
    use courier_core::{MessageKind, MessagingQos, ParticipantId};

    fn provider() -> ParticipantId {
        ParticipantId::from_raw("provider")
    }

    fn message(kind: MessageKind) -> Message {
        Message::new(
            kind,
            ParticipantId::from_raw("proxy"),
            provider(),
            &MessagingQos::default(),
            Bytes::from_static(b"{}"),
        )
    }

    fn sender_with(transport: Arc<MockTransport>) -> MessageSender {
        let routing = Arc::new(RoutingTable::new());
        routing.put(
            provider(),
            Address::broker("provider/topic"),
            true,
            now_ms() + 60_000,
            false,
        );
        MessageSender::new(
            transport as _,
            routing,
            Address::broker("replies/self"),
            SchedulerConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn request_kinds_are_stamped_with_reply_to() {
        let transport = Arc::new(MockTransport::new());
        let sender = sender_with(Arc::clone(&transport));

        for kind in [
            MessageKind::Request,
            MessageKind::SubscriptionRequest,
            MessageKind::BroadcastSubscriptionRequest,
        ] {
            sender.send_tracked(message(kind)).unwrap().outcome().await.unwrap();
        }

        for (_, sent) in transport.sent() {
            assert_eq!(sent.reply_to, Some(Address::broker("replies/self")));
        }
    }

    #[tokio::test]
    async fn non_request_kinds_are_left_untouched() {
        let transport = Arc::new(MockTransport::new());
        let sender = sender_with(Arc::clone(&transport));

        for kind in [
            MessageKind::Reply,
            MessageKind::OneWay,
            MessageKind::SubscriptionPublication,
            MessageKind::SubscriptionStop,
        ] {
            sender.send_tracked(message(kind)).unwrap().outcome().await.unwrap();
        }

        for (_, sent) in transport.sent() {
            assert_eq!(sent.reply_to, None);
        }
    }

    #[tokio::test]
    async fn unknown_participant_fails_before_scheduling() {
        let transport = Arc::new(MockTransport::new());
        let routing = Arc::new(RoutingTable::new());
        let sender = MessageSender::new(
            Arc::clone(&transport) as _,
            routing,
            Address::broker("replies/self"),
            SchedulerConfig::default(),
        )
        .unwrap();

        let err = sender.send(message(MessageKind::Request)).unwrap_err();
        assert!(matches!(err, MiddlewareError::UnknownParticipant(_)));
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn expired_message_is_rejected() {
        let transport = Arc::new(MockTransport::new());
        let sender = sender_with(Arc::clone(&transport));

        let mut msg = message(MessageKind::Request);
        msg.expiry_date_ms = now_ms() - 1;
        let err = sender.send(msg).unwrap_err();
        assert!(matches!(err, MiddlewareError::ExpiredMessage { .. }));
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn sends_resolve_through_the_routing_table() {
        let transport = Arc::new(MockTransport::new());
        let sender = sender_with(Arc::clone(&transport));

        sender
            .send_tracked(message(MessageKind::Request))
            .unwrap()
            .outcome()
            .await
            .unwrap();

        let (address, _) = &transport.sent()[0];
        assert_eq!(*address, Address::broker("provider/topic"));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_silent() {
        let transport = Arc::new(MockTransport::new());
        let sender = sender_with(transport);
        sender.shutdown().await;
        sender.shutdown().await;
    }
}
