use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use courier_core::{now_ms, Address, InboundTransport, Message, MiddlewareError};

use crate::admission::{AdmissionConfig, AdmissionControl, IntakeState};

/// Downstream handler for messages the skeleton accepts.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, message: Message);
}

/// Inbound endpoint over a broker connection shared by a group of nodes.
///
/// Subscribes to a `$share` group topic so the broker load-balances requests
/// across the group, plus a per-node reply topic. Request-family messages
/// count toward an admission limit; crossing its upper watermark pauses
/// transport intake and draining below the lower watermark resumes it.
pub struct SharedSubscriptionSkeleton {
    transport: Arc<dyn InboundTransport>,
    processor: Arc<dyn MessageProcessor>,
    admission: AdmissionControl,
    shared_topic: String,
    reply_topic: String,
}

impl std::fmt::Debug for SharedSubscriptionSkeleton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSubscriptionSkeleton")
            .field("admission", &self.admission)
            .field("shared_topic", &self.shared_topic)
            .field("reply_topic", &self.reply_topic)
            .finish_non_exhaustive()
    }
}

impl SharedSubscriptionSkeleton {
    pub fn new(
        transport: Arc<dyn InboundTransport>,
        processor: Arc<dyn MessageProcessor>,
        own_address: &Address,
        reply_to_address: &Address,
        channel_id: &str,
        admission_config: AdmissionConfig,
    ) -> Result<Self, MiddlewareError> {
        let admission = AdmissionControl::new(admission_config)?;
        let group = sanitize_channel_id(channel_id)?;
        let own_topic = broker_topic(own_address)?;
        let reply_to_topic = broker_topic(reply_to_address)?;
        Ok(Self {
            transport,
            processor,
            admission,
            shared_topic: format!("$share:{group}:{own_topic}/#"),
            reply_topic: format!("{reply_to_topic}/#"),
        })
    }

    /// Subscribe to the shared request topic and the reply topic.
    pub async fn subscribe(&self) -> Result<(), MiddlewareError> {
        self.transport
            .subscribe(&self.shared_topic)
            .await
            .map_err(MiddlewareError::internal)?;
        self.transport
            .subscribe(&self.reply_topic)
            .await
            .map_err(MiddlewareError::internal)?;
        info!(
            shared_topic = %self.shared_topic,
            reply_topic = %self.reply_topic,
            "inbound subscriptions established"
        );
        Ok(())
    }

    /// Entry point for messages arriving from the transport.
    ///
    /// Expired messages are dropped. Request-family messages are admitted
    /// against the in-flight limit; everything else bypasses it.
    pub fn on_message_received(self: &Arc<Self>, message: Message) {
        let now = now_ms();
        if message.is_expired(now) {
            warn!(
                message_id = %message.id,
                kind = message.kind.kind_str(),
                expiry_date_ms = message.expiry_date_ms,
                now_ms = now,
                "dropping expired inbound message"
            );
            return;
        }

        if !message.kind.is_request_kind() {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.processor.process(message).await;
            });
            return;
        }

        if self.admission.request_accepted() == Some(IntakeState::Throttled) {
            warn!(
                in_flight = self.admission.in_flight(),
                "request intake paused, in-flight limit reached"
            );
            self.transport.pause_intake();
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.processor.process(message).await;
            if this.admission.request_completed() == Some(IntakeState::Flowing) {
                info!(
                    in_flight = this.admission.in_flight(),
                    "request intake resumed"
                );
                this.transport.resume_intake();
            }
        });
    }

    pub fn intake_state(&self) -> IntakeState {
        self.admission.state()
    }

    pub fn in_flight(&self) -> usize {
        self.admission.in_flight()
    }

    pub fn shared_topic(&self) -> &str {
        &self.shared_topic
    }

    pub fn reply_topic(&self) -> &str {
        &self.reply_topic
    }
}

fn broker_topic(address: &Address) -> Result<&str, MiddlewareError> {
    address.topic().ok_or_else(|| {
        MiddlewareError::InvalidTopic(format!("address {address} carries no broker topic"))
    })
}

/// Strip a channel id down to the alphabetic characters brokers accept in a
/// shared-group name.
fn sanitize_channel_id(channel_id: &str) -> Result<String, MiddlewareError> {
    let sanitized: String = channel_id.chars().filter(char::is_ascii_alphabetic).collect();
    if sanitized.is_empty() {
        return Err(MiddlewareError::InvalidTopic(format!(
            "channel id {channel_id:?} has no alphabetic characters to form a group name"
        )));
    }
    Ok(sanitized)
}
