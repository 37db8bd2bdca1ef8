use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use courier_core::{
    MessagingQos, MiddlewareError, ParticipantId, ResultFuture, SubscriptionId,
};
use courier_messaging::MessageSender;

use crate::connector::{ArbitrationResult, Connector};
use crate::invocation::{
    AttributeSubscribeInvocation, BroadcastSubscribeInvocation, MethodInvocation,
    SubscriptionInvocation, UnsubscribeInvocation,
};
use crate::subscriptions::SubscriptionRegistry;

struct DispatchState {
    connector: Option<Arc<Connector>>,
    queued_methods: VecDeque<MethodInvocation>,
    queued_subscriptions: VecDeque<SubscriptionInvocation>,
}

/// Front end of a proxy while discovery may still be in flight.
///
/// Invocations arriving before arbitration completes are queued in arrival
/// order; once `on_connector_established` fires they drain FIFO through the
/// connector, and every later invocation dispatches directly. Callers never
/// observe the difference except in latency.
pub struct ProxyDispatcher {
    proxy_participant_id: ParticipantId,
    qos: MessagingQos,
    discovery_timeout: Duration,
    sender: Arc<MessageSender>,
    registry: Arc<SubscriptionRegistry>,
    state: Mutex<DispatchState>,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
}

impl ProxyDispatcher {
    pub fn new(
        proxy_participant_id: ParticipantId,
        qos: MessagingQos,
        discovery_timeout: Duration,
        sender: Arc<MessageSender>,
    ) -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            proxy_participant_id,
            qos,
            discovery_timeout,
            sender,
            registry: Arc::new(SubscriptionRegistry::new()),
            state: Mutex::new(DispatchState {
                connector: None,
                queued_methods: VecDeque::new(),
                queued_subscriptions: VecDeque::new(),
            }),
            ready_tx,
            ready_rx,
        }
    }

    pub fn proxy_participant_id(&self) -> &ParticipantId {
        &self.proxy_participant_id
    }

    pub fn subscription_registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn connector_available(&self) -> bool {
        self.state.lock().connector.is_some()
    }

    /// Call a method and wait for its reply. Blocks (asynchronously) until
    /// discovery completes, up to the configured timeout.
    pub async fn call_synchronous(
        &self,
        method: impl Into<String>,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, MiddlewareError> {
        let connector = self.wait_for_connector().await?;
        let (invocation, future) = MethodInvocation::new(method, args);
        connector.dispatch_method(invocation);
        future.outcome().await
    }

    /// Call a method without waiting for discovery; the returned future
    /// resolves once the reply (or a terminal failure) arrives.
    pub fn call_asynchronous(
        &self,
        method: impl Into<String>,
        args: serde_json::Value,
    ) -> ResultFuture<serde_json::Value> {
        let (invocation, future) = MethodInvocation::new(method, args);
        let connector = {
            let mut state = self.state.lock();
            match &state.connector {
                Some(connector) => Arc::clone(connector),
                None => {
                    state.queued_methods.push_back(invocation);
                    return future;
                }
            }
        };
        connector.dispatch_method(invocation);
        future
    }

    /// Subscribe to an attribute. The subscription id is returned
    /// immediately, even while the request is still queued behind discovery.
    pub fn subscribe_attribute(
        &self,
        attribute: impl Into<String>,
    ) -> (SubscriptionId, ResultFuture<SubscriptionId>) {
        let (invocation, future) = AttributeSubscribeInvocation::new(attribute);
        let id = invocation.subscription_id.clone();
        self.queue_or_dispatch_subscription(SubscriptionInvocation::Attribute(invocation));
        (id, future)
    }

    /// Subscribe to a broadcast. Same id semantics as attribute subscribe.
    pub fn subscribe_broadcast(
        &self,
        broadcast: impl Into<String>,
    ) -> (SubscriptionId, ResultFuture<SubscriptionId>) {
        let (invocation, future) = BroadcastSubscribeInvocation::new(broadcast);
        let id = invocation.subscription_id.clone();
        self.queue_or_dispatch_subscription(SubscriptionInvocation::Broadcast(invocation));
        (id, future)
    }

    /// Tear down a subscription. The local registration is removed before
    /// the stop request is dispatched or queued, so publications stop being
    /// accepted immediately regardless of discovery state.
    pub fn unsubscribe(&self, subscription_id: SubscriptionId) -> ResultFuture<()> {
        self.registry.unregister(&subscription_id);
        let (invocation, future) = UnsubscribeInvocation::new(subscription_id);
        self.queue_or_dispatch_subscription(SubscriptionInvocation::Unsubscribe(invocation));
        future
    }

    fn queue_or_dispatch_subscription(&self, invocation: SubscriptionInvocation) {
        let connector = {
            let mut state = self.state.lock();
            match &state.connector {
                Some(connector) => Arc::clone(connector),
                None => {
                    state.queued_subscriptions.push_back(invocation);
                    return;
                }
            }
        };
        connector.dispatch_subscription(invocation);
    }

    /// Bind the arbitrated provider and drain everything queued while
    /// discovery ran. A second call is ignored.
    pub fn on_connector_established(&self, arbitration: ArbitrationResult) {
        let connector = Arc::new(Connector::new(
            self.proxy_participant_id.clone(),
            arbitration,
            self.qos.clone(),
            Arc::clone(&self.sender),
            Arc::clone(&self.registry),
        ));

        // Install the connector and take the queues in one critical section
        // so no invocation can slip between the flip and the drain.
        let (methods, subscriptions) = {
            let mut state = self.state.lock();
            if state.connector.is_some() {
                warn!(
                    proxy = %self.proxy_participant_id,
                    "connector already established, ignoring repeat arbitration"
                );
                return;
            }
            state.connector = Some(Arc::clone(&connector));
            (
                std::mem::take(&mut state.queued_methods),
                std::mem::take(&mut state.queued_subscriptions),
            )
        };

        let _ = self.ready_tx.send(true);
        info!(
            proxy = %self.proxy_participant_id,
            provider = %connector.provider_participant_id(),
            queued_methods = methods.len(),
            queued_subscriptions = subscriptions.len(),
            "connector established, draining queued invocations"
        );

        // Dispatch outside the lock; a slow transport must not block callers.
        for invocation in methods {
            connector.dispatch_method(invocation);
        }
        for invocation in subscriptions {
            connector.dispatch_subscription(invocation);
        }
    }

    /// Route an inbound reply payload to the parked call it answers.
    pub fn on_reply(
        &self,
        request_message_id: &courier_core::MessageId,
        outcome: Result<serde_json::Value, MiddlewareError>,
    ) -> bool {
        let connector = self.state.lock().connector.clone();
        match connector {
            Some(connector) => connector.complete_reply(request_message_id, outcome),
            None => {
                warn!(
                    request_message_id = %request_message_id,
                    "reply received before any connector was established"
                );
                false
            }
        }
    }

    async fn wait_for_connector(&self) -> Result<Arc<Connector>, MiddlewareError> {
        if let Some(connector) = self.state.lock().connector.clone() {
            return Ok(connector);
        }
        let mut ready = self.ready_rx.clone();
        let wait = ready.wait_for(|ready| *ready);
        tokio::time::timeout(self.discovery_timeout, wait)
            .await
            .map_err(|_| MiddlewareError::ArbitrationTimeout {
                timeout: self.discovery_timeout,
            })?
            .map_err(|_| MiddlewareError::internal("proxy dispatcher dropped during discovery"))?;
        self.state
            .lock()
            .connector
            .clone()
            .ok_or_else(|| MiddlewareError::internal("ready signal without connector"))
    }
}
