//! # courier-proxy
//!
//! Caller-facing side of the middleware: invocation types, the connector
//! that binds a proxy to its arbitrated provider, and the dispatcher that
//! queues invocations until discovery completes and drains them in order.

pub mod connector;
pub mod invocation;
pub mod proxy;
pub mod subscriptions;

pub use connector::{ArbitrationResult, Connector};
pub use invocation::{
    AttributeSubscribeInvocation, BroadcastSubscribeInvocation, MethodInvocation,
    SubscriptionInvocation, UnsubscribeInvocation,
};
pub use proxy::ProxyDispatcher;
pub use subscriptions::{SubscriptionKind, SubscriptionRegistry};
