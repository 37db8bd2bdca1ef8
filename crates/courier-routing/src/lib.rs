//! # courier-routing
//!
//! Participant routing directory: the single source of truth mapping a
//! participant identifier to a reachable transport address, with lease-like
//! expiry and a sticky escape hatch for well-known bootstrap addresses.

mod table;
mod validator;

pub use table::{RoutingEntry, RoutingTable};
pub use validator::{AddressValidator, AllowReplacement};
