use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use courier_core::{now_ms, Address, MiddlewareError, ParticipantId};

use crate::validator::{AddressValidator, AllowReplacement};

/// One routing table record. Owned exclusively by the table; callers get
/// clones of the address, never a live reference into the map.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutingEntry {
    pub address: Address,
    pub is_globally_visible: bool,
    /// Absolute expiry in epoch ms. Ignored while `is_sticky` is set.
    pub expiry_date_ms: i64,
    /// Sticky entries never expire and can never be overwritten; `remove`
    /// is the only way to get rid of one.
    pub is_sticky: bool,
}

/// Concurrent directory from participant id to transport address.
///
/// Consulted on every outbound send. All operations are safe under
/// arbitrary concurrent callers; updates are atomic per key through the map
/// entry API.
pub struct RoutingTable {
    entries: DashMap<ParticipantId, RoutingEntry>,
    validator: Arc<dyn AddressValidator>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::with_validator(Arc::new(AllowReplacement))
    }

    pub fn with_validator(validator: Arc<dyn AddressValidator>) -> Self {
        Self {
            entries: DashMap::new(),
            validator,
        }
    }

    /// Resolve a participant to its transport address.
    pub fn get(&self, participant: &ParticipantId) -> Result<Address, MiddlewareError> {
        self.entries
            .get(participant)
            .map(|entry| entry.address.clone())
            .ok_or_else(|| MiddlewareError::UnknownParticipant(participant.clone()))
    }

    /// Insert or merge a routing entry.
    ///
    /// A write against an existing sticky entry is ignored entirely. For a
    /// non-sticky existing entry the validator decides whether the address
    /// (and visibility) may be replaced; independently, the expiry is raised
    /// to the later of old and new, and the sticky flag is raised when the
    /// write requests it. Sticky is one-directional: false to true only.
    pub fn put(
        &self,
        participant: ParticipantId,
        address: Address,
        is_globally_visible: bool,
        expiry_date_ms: i64,
        is_sticky: bool,
    ) {
        match self.entries.entry(participant) {
            Entry::Vacant(slot) => {
                trace!(participant = %slot.key(), address = %address, "routing entry created");
                slot.insert(RoutingEntry {
                    address,
                    is_globally_visible,
                    expiry_date_ms,
                    is_sticky,
                });
            }
            Entry::Occupied(mut slot) => {
                if slot.get().is_sticky {
                    debug!(participant = %slot.key(), "ignoring write to sticky routing entry");
                    return;
                }
                let existing = slot.get_mut();
                if existing.address != address
                    && self.validator.is_replaceable(existing, &address)
                {
                    existing.address = address;
                    existing.is_globally_visible = is_globally_visible;
                }
                existing.expiry_date_ms = existing.expiry_date_ms.max(expiry_date_ms);
                if is_sticky {
                    existing.is_sticky = true;
                }
            }
        }
    }

    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.entries.contains_key(participant)
    }

    pub fn is_globally_visible(&self, participant: &ParticipantId) -> Result<bool, MiddlewareError> {
        self.entries
            .get(participant)
            .map(|entry| entry.is_globally_visible)
            .ok_or_else(|| MiddlewareError::UnknownParticipant(participant.clone()))
    }

    pub fn expiry_date_ms(&self, participant: &ParticipantId) -> Result<i64, MiddlewareError> {
        self.entries
            .get(participant)
            .map(|entry| entry.expiry_date_ms)
            .ok_or_else(|| MiddlewareError::UnknownParticipant(participant.clone()))
    }

    pub fn is_sticky(&self, participant: &ParticipantId) -> Result<bool, MiddlewareError> {
        self.entries
            .get(participant)
            .map(|entry| entry.is_sticky)
            .ok_or_else(|| MiddlewareError::UnknownParticipant(participant.clone()))
    }

    /// Unconditional delete, sticky entries included.
    pub fn remove(&self, participant: &ParticipantId) {
        if self.entries.remove(participant).is_some() {
            trace!(participant = %participant, "routing entry removed");
        }
    }

    /// Apply a read-only operation to every address currently stored.
    ///
    /// Iterates over a snapshot so the operation can run while other
    /// threads put and remove entries.
    pub fn apply(&self, mut operation: impl FnMut(&ParticipantId, &Address)) {
        let snapshot: Vec<(ParticipantId, Address)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().address.clone()))
            .collect();
        for (participant, address) in &snapshot {
            operation(participant, address);
        }
    }

    /// Delete every expired, non-sticky entry. Sticky entries survive
    /// regardless of age.
    pub fn purge(&self) {
        let now = now_ms();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.is_sticky || entry.expiry_date_ms >= now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "purged expired routing entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(name: &str) -> ParticipantId {
        ParticipantId::from_raw(name)
    }

    fn far_future() -> i64 {
        now_ms() + 3_600_000
    }

    #[test]
    fn get_unknown_fails() {
        let table = RoutingTable::new();
        let missing = participant("missing");
        assert_eq!(
            table.get(&missing).unwrap_err(),
            MiddlewareError::UnknownParticipant(missing.clone())
        );
        assert!(matches!(
            table.is_globally_visible(&missing),
            Err(MiddlewareError::UnknownParticipant(_))
        ));
        assert!(matches!(
            table.expiry_date_ms(&missing),
            Err(MiddlewareError::UnknownParticipant(_))
        ));
        assert!(matches!(
            table.is_sticky(&missing),
            Err(MiddlewareError::UnknownParticipant(_))
        ));
        assert!(!table.contains(&missing));
    }

    #[test]
    fn put_then_get_roundtrip() {
        let table = RoutingTable::new();
        let p = participant("provider-a");
        let addr = Address::broker("provider-a/topic");
        table.put(p.clone(), addr.clone(), true, far_future(), false);

        assert_eq!(table.get(&p).unwrap(), addr);
        assert!(table.is_globally_visible(&p).unwrap());
        assert!(!table.is_sticky(&p).unwrap());
    }

    #[test]
    fn sticky_entry_ignores_all_later_writes() {
        let table = RoutingTable::new();
        let p = participant("bootstrap");
        let original = Address::broker("bootstrap/topic");
        table.put(p.clone(), original.clone(), true, 1_000, true);

        table.put(p.clone(), Address::broker("other/topic"), false, far_future(), false);
        table.put(p.clone(), Address::socket("h", 1), false, far_future(), true);

        assert_eq!(table.get(&p).unwrap(), original);
        assert!(table.is_globally_visible(&p).unwrap());
        assert_eq!(table.expiry_date_ms(&p).unwrap(), 1_000);
        assert!(table.is_sticky(&p).unwrap());
    }

    #[test]
    fn later_expiry_wins_on_conflicting_put() {
        let table = RoutingTable::new();
        let p = participant("provider-b");
        let addr = Address::broker("provider-b/topic");
        table.put(p.clone(), addr.clone(), true, 5_000, false);
        table.put(p.clone(), addr.clone(), true, 2_000, false);
        assert_eq!(table.expiry_date_ms(&p).unwrap(), 5_000);

        table.put(p.clone(), addr, true, 9_000, false);
        assert_eq!(table.expiry_date_ms(&p).unwrap(), 9_000);
    }

    #[test]
    fn sticky_flag_is_one_directional() {
        let table = RoutingTable::new();
        let p = participant("provider-c");
        let addr = Address::broker("provider-c/topic");
        table.put(p.clone(), addr.clone(), true, far_future(), false);
        table.put(p.clone(), addr.clone(), true, far_future(), true);
        assert!(table.is_sticky(&p).unwrap());

        // A non-sticky write cannot lower the flag (the entry is sticky now,
        // so the write is ignored outright).
        table.put(p.clone(), addr, true, far_future(), false);
        assert!(table.is_sticky(&p).unwrap());
    }

    #[test]
    fn validator_veto_keeps_old_address_but_raises_expiry() {
        struct DenyAll;
        impl AddressValidator for DenyAll {
            fn is_replaceable(&self, _e: &RoutingEntry, _a: &Address) -> bool {
                false
            }
        }

        let table = RoutingTable::with_validator(Arc::new(DenyAll));
        let p = participant("provider-d");
        let original = Address::broker("original/topic");
        table.put(p.clone(), original.clone(), true, 1_000, false);
        table.put(p.clone(), Address::broker("replacement/topic"), false, 9_000, false);

        assert_eq!(table.get(&p).unwrap(), original);
        assert!(table.is_globally_visible(&p).unwrap());
        assert_eq!(table.expiry_date_ms(&p).unwrap(), 9_000);
    }

    #[test]
    fn remove_deletes_sticky_entries() {
        let table = RoutingTable::new();
        let p = participant("bootstrap");
        table.put(p.clone(), Address::broker("t"), true, 0, true);
        table.remove(&p);
        assert!(!table.contains(&p));
    }

    #[test]
    fn purge_removes_expired_non_sticky_only() {
        let table = RoutingTable::new();
        let expired = participant("expired");
        let live = participant("live");
        let sticky = participant("sticky");
        table.put(expired.clone(), Address::broker("a"), true, now_ms() - 10, false);
        table.put(live.clone(), Address::broker("b"), true, far_future(), false);
        table.put(sticky.clone(), Address::broker("c"), true, now_ms() - 10, true);

        table.purge();

        assert!(!table.contains(&expired));
        assert!(table.contains(&live));
        assert!(table.contains(&sticky));
    }

    #[test]
    fn apply_visits_every_address() {
        let table = RoutingTable::new();
        table.put(participant("a"), Address::broker("ta"), true, far_future(), false);
        table.put(participant("b"), Address::broker("tb"), true, far_future(), false);

        let mut seen = Vec::new();
        table.apply(|p, a| seen.push((p.clone(), a.clone())));

        assert_eq!(seen.len(), 2);
        assert!(seen.iter().any(|(p, _)| p.as_str() == "a"));
        assert!(seen.iter().any(|(p, _)| p.as_str() == "b"));
    }

    #[test]
    fn concurrent_puts_land_consistently() {
        let table = Arc::new(RoutingTable::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let table = Arc::clone(&table);
            handles.push(std::thread::spawn(move || {
                for j in 0..50 {
                    table.put(
                        participant(&format!("p{}", j % 10)),
                        Address::broker(format!("t{i}")),
                        true,
                        far_future() + i,
                        false,
                    );
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(table.len(), 10);
        for j in 0..10 {
            assert!(table.get(&participant(&format!("p{j}"))).is_ok());
        }
    }
}
