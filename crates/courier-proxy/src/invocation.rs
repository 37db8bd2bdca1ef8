use courier_core::{result_pair, ResultFuture, ResultSink, SubscriptionId};

/// A method call captured at the proxy surface, decoupled from when a
/// connector becomes available to dispatch it.
#[derive(Debug)]
pub struct MethodInvocation {
    pub method: String,
    pub args: serde_json::Value,
    pub(crate) result: ResultSink<serde_json::Value>,
}

impl MethodInvocation {
    pub fn new(
        method: impl Into<String>,
        args: serde_json::Value,
    ) -> (Self, ResultFuture<serde_json::Value>) {
        let (result, future) = result_pair();
        (
            Self {
                method: method.into(),
                args,
                result,
            },
            future,
        )
    }
}

/// Subscribe to change notifications for a provider attribute.
///
/// The subscription id is allocated up front so the caller can hold it
/// before the request is dispatched, or even before a connector exists.
#[derive(Debug)]
pub struct AttributeSubscribeInvocation {
    pub attribute: String,
    pub subscription_id: SubscriptionId,
    pub(crate) result: ResultSink<SubscriptionId>,
}

impl AttributeSubscribeInvocation {
    pub fn new(attribute: impl Into<String>) -> (Self, ResultFuture<SubscriptionId>) {
        let (result, future) = result_pair();
        (
            Self {
                attribute: attribute.into(),
                subscription_id: SubscriptionId::new(),
                result,
            },
            future,
        )
    }
}

/// Subscribe to a named provider broadcast.
#[derive(Debug)]
pub struct BroadcastSubscribeInvocation {
    pub broadcast: String,
    pub subscription_id: SubscriptionId,
    pub(crate) result: ResultSink<SubscriptionId>,
}

impl BroadcastSubscribeInvocation {
    pub fn new(broadcast: impl Into<String>) -> (Self, ResultFuture<SubscriptionId>) {
        let (result, future) = result_pair();
        (
            Self {
                broadcast: broadcast.into(),
                subscription_id: SubscriptionId::new(),
                result,
            },
            future,
        )
    }
}

/// Tear down an existing subscription.
#[derive(Debug)]
pub struct UnsubscribeInvocation {
    pub subscription_id: SubscriptionId,
    pub(crate) result: ResultSink<()>,
}

impl UnsubscribeInvocation {
    pub fn new(subscription_id: SubscriptionId) -> (Self, ResultFuture<()>) {
        let (result, future) = result_pair();
        (
            Self {
                subscription_id,
                result,
            },
            future,
        )
    }
}

/// Subscription-lifecycle operations share one queue so their relative
/// order survives the queued phase.
#[derive(Debug)]
pub enum SubscriptionInvocation {
    Attribute(AttributeSubscribeInvocation),
    Broadcast(BroadcastSubscribeInvocation),
    Unsubscribe(UnsubscribeInvocation),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscription_id_is_available_before_dispatch() {
        let (invocation, future) = AttributeSubscribeInvocation::new("position");
        let id = invocation.subscription_id.clone();
        invocation.result.resolve(invocation.subscription_id);
        assert_eq!(future.outcome().await.unwrap(), id);
    }

    #[tokio::test]
    async fn method_invocation_carries_args_through() {
        let (invocation, _future) =
            MethodInvocation::new("add", serde_json::json!({ "a": 1, "b": 2 }));
        assert_eq!(invocation.method, "add");
        assert_eq!(invocation.args["b"], 2);
    }
}
