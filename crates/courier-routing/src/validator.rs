use courier_core::Address;

use crate::table::RoutingEntry;

/// Decides whether a conflicting non-sticky `put` may replace the stored
/// address. Sticky entries are never offered for replacement.
pub trait AddressValidator: Send + Sync {
    fn is_replaceable(&self, existing: &RoutingEntry, new_address: &Address) -> bool;
}

/// Default policy: any non-sticky address may be replaced.
pub struct AllowReplacement;

impl AddressValidator for AllowReplacement {
    fn is_replaceable(&self, _existing: &RoutingEntry, _new_address: &Address) -> bool {
        true
    }
}
