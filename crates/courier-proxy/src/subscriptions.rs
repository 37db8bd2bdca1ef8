use dashmap::DashMap;

use courier_core::SubscriptionId;

/// What a subscription watches on the provider side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionKind {
    Attribute,
    Broadcast,
}

#[derive(Debug, Clone)]
struct SubscriptionEntry {
    kind: SubscriptionKind,
    /// Attribute or broadcast name the subscription is bound to.
    source: String,
}

/// Live subscriptions held by one proxy, keyed by subscription id.
///
/// Registration happens when a subscribe invocation is dispatched or queued;
/// removal is unconditional so an unsubscribe that races a pending subscribe
/// still leaves no stale entry behind.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: DashMap<SubscriptionId, SubscriptionEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: SubscriptionId, kind: SubscriptionKind, source: impl Into<String>) {
        self.entries.insert(
            id,
            SubscriptionEntry {
                kind,
                source: source.into(),
            },
        );
    }

    /// Returns whether an entry was present.
    pub fn unregister(&self, id: &SubscriptionId) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn kind(&self, id: &SubscriptionId) -> Option<SubscriptionKind> {
        self.entries.get(id).map(|entry| entry.kind.clone())
    }

    pub fn source(&self, id: &SubscriptionId) -> Option<String> {
        self.entries.get(id).map(|entry| entry.source.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
