use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

use courier_core::{
    now_ms, Message, MessageId, MessageKind, MessagingQos, MiddlewareError, ParticipantId,
    ResultSink, SubscriptionId,
};
use courier_messaging::MessageSender;

use crate::invocation::{MethodInvocation, SubscriptionInvocation};
use crate::subscriptions::{SubscriptionKind, SubscriptionRegistry};

/// Outcome of discovery: the provider the proxy is now bound to. Kept
/// opaque so arbitration strategies can evolve without touching dispatch.
#[derive(Debug, Clone)]
pub struct ArbitrationResult {
    pub provider_participant_id: ParticipantId,
}

#[derive(Serialize)]
struct RequestBody<'a> {
    method: &'a str,
    args: &'a serde_json::Value,
}

#[derive(Serialize)]
struct SubscribeBody<'a> {
    subscription_id: &'a SubscriptionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    attribute: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    broadcast: Option<&'a str>,
}

#[derive(Serialize)]
struct StopBody<'a> {
    subscription_id: &'a SubscriptionId,
}

/// Bound connection between one proxy and its arbitrated provider.
///
/// Turns invocations into wire messages and tracks reply correlation state.
pub struct Connector {
    proxy_participant_id: ParticipantId,
    provider_participant_id: ParticipantId,
    qos: MessagingQos,
    sender: Arc<MessageSender>,
    registry: Arc<SubscriptionRegistry>,
    pending_replies: DashMap<MessageId, ResultSink<serde_json::Value>>,
}

impl Connector {
    pub fn new(
        proxy_participant_id: ParticipantId,
        arbitration: ArbitrationResult,
        qos: MessagingQos,
        sender: Arc<MessageSender>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            proxy_participant_id,
            provider_participant_id: arbitration.provider_participant_id,
            qos,
            sender,
            registry,
            pending_replies: DashMap::new(),
        }
    }

    pub fn provider_participant_id(&self) -> &ParticipantId {
        &self.provider_participant_id
    }

    /// Encode and send a method call. The invocation's result handle is
    /// parked until the matching reply arrives; a terminal delivery failure
    /// (fatal transport error, ttl exhausted) fails it instead, and a
    /// delivered request whose reply never arrives is failed once the
    /// message's own expiry passes. No call stays parked beyond its ttl.
    pub fn dispatch_method(self: &Arc<Self>, invocation: MethodInvocation) {
        let body = RequestBody {
            method: &invocation.method,
            args: &invocation.args,
        };
        let payload = match serde_json::to_vec(&body) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                // Encoding failures are terminal; retrying cannot help.
                invocation
                    .result
                    .fail(MiddlewareError::MessageNotSent(err.to_string()));
                return;
            }
        };

        let message = self.message(MessageKind::Request, payload);
        let message_id = message.id.clone();
        let expiry_date_ms = message.expiry_date_ms;
        self.pending_replies.insert(message_id.clone(), invocation.result);

        match self.sender.send_tracked(message) {
            Ok(delivery) => {
                debug!(
                    message_id = %message_id,
                    method = %invocation.method,
                    provider = %self.provider_participant_id,
                    "method request dispatched"
                );
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    match delivery.outcome().await {
                        Err(err) => {
                            if let Some((_, sink)) = this.pending_replies.remove(&message_id) {
                                warn!(
                                    message_id = %message_id,
                                    error = %err,
                                    "request delivery failed, failing parked call"
                                );
                                sink.fail(err);
                            }
                        }
                        Ok(()) => {
                            // Delivered. Hold the park only until the
                            // message's own expiry; a reply after that would
                            // be dropped by the recipient's expiry check
                            // anyway.
                            let remaining = expiry_date_ms.saturating_sub(now_ms()).max(0);
                            tokio::time::sleep(Duration::from_millis(remaining as u64)).await;
                            if let Some((_, sink)) = this.pending_replies.remove(&message_id) {
                                let now = now_ms();
                                warn!(
                                    message_id = %message_id,
                                    expiry_date_ms,
                                    "no reply before message ttl expired, failing parked call"
                                );
                                sink.fail(MiddlewareError::ExpiredMessage {
                                    expiry_date_ms,
                                    now_ms: now,
                                });
                            }
                        }
                    }
                });
            }
            Err(err) => {
                if let Some((_, sink)) = self.pending_replies.remove(&message_id) {
                    sink.fail(err);
                }
            }
        }
    }

    /// Complete a parked method call with the reply payload. Returns false
    /// when no call is waiting under that message id.
    pub fn complete_reply(
        &self,
        request_message_id: &MessageId,
        outcome: Result<serde_json::Value, MiddlewareError>,
    ) -> bool {
        match self.pending_replies.remove(request_message_id) {
            Some((_, sink)) => {
                match outcome {
                    Ok(value) => sink.resolve(value),
                    Err(err) => sink.fail(err),
                }
                true
            }
            None => {
                warn!(
                    request_message_id = %request_message_id,
                    "reply for unknown or already-completed request"
                );
                false
            }
        }
    }

    /// Encode and send a subscription-lifecycle operation.
    pub fn dispatch_subscription(&self, invocation: SubscriptionInvocation) {
        match invocation {
            SubscriptionInvocation::Attribute(sub) => {
                self.registry.register(
                    sub.subscription_id.clone(),
                    SubscriptionKind::Attribute,
                    sub.attribute.clone(),
                );
                self.send_subscribe(
                    MessageKind::SubscriptionRequest,
                    &sub.subscription_id,
                    Some(&sub.attribute),
                    None,
                    sub.result,
                );
            }
            SubscriptionInvocation::Broadcast(sub) => {
                self.registry.register(
                    sub.subscription_id.clone(),
                    SubscriptionKind::Broadcast,
                    sub.broadcast.clone(),
                );
                self.send_subscribe(
                    MessageKind::BroadcastSubscriptionRequest,
                    &sub.subscription_id,
                    None,
                    Some(&sub.broadcast),
                    sub.result,
                );
            }
            SubscriptionInvocation::Unsubscribe(stop) => {
                // Removal is unconditional at dispatch as well as at call
                // time: a queued subscribe drained just before this re-adds
                // its entry, and that entry must not outlive the unsubscribe.
                self.registry.unregister(&stop.subscription_id);
                let body = StopBody {
                    subscription_id: &stop.subscription_id,
                };
                let payload = match serde_json::to_vec(&body) {
                    Ok(bytes) => Bytes::from(bytes),
                    Err(err) => {
                        stop.result
                            .fail(MiddlewareError::MessageNotSent(err.to_string()));
                        return;
                    }
                };
                let message = self.message(MessageKind::SubscriptionStop, payload);
                match self.sender.send(message) {
                    Ok(()) => stop.result.resolve(()),
                    Err(err) => stop.result.fail(err),
                }
            }
        }
    }

    fn send_subscribe(
        &self,
        kind: MessageKind,
        subscription_id: &SubscriptionId,
        attribute: Option<&str>,
        broadcast: Option<&str>,
        result: ResultSink<SubscriptionId>,
    ) {
        let body = SubscribeBody {
            subscription_id,
            attribute,
            broadcast,
        };
        let payload = match serde_json::to_vec(&body) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                result.fail(MiddlewareError::MessageNotSent(err.to_string()));
                return;
            }
        };
        let message = self.message(kind, payload);
        match self.sender.send(message) {
            Ok(()) => result.resolve(subscription_id.clone()),
            Err(err) => result.fail(err),
        }
    }

    fn message(&self, kind: MessageKind, payload: Bytes) -> Message {
        Message::new(
            kind,
            self.proxy_participant_id.clone(),
            self.provider_participant_id.clone(),
            &self.qos,
            payload,
        )
    }

    #[cfg(test)]
    pub(crate) fn pending_reply_count(&self) -> usize {
        self.pending_replies.len()
    }
}
