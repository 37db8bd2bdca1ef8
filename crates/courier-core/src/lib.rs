//! # courier-core
//!
//! Shared vocabulary for the courier middleware runtime: participant and
//! message identifiers, transport addresses, the message envelope, the
//! middleware error taxonomy, collaborator traits and one-shot result
//! handles. Higher layers (routing, messaging, proxy) build on these types
//! without depending on each other.

pub mod address;
pub mod errors;
pub mod ids;
pub mod message;
pub mod result;
pub mod transport;

pub use address::Address;
pub use errors::MiddlewareError;
pub use ids::{MessageId, ParticipantId, SubscriptionId};
pub use message::{now_ms, Message, MessageKind, MessagingQos};
pub use result::{result_pair, ResultFuture, ResultSink};
pub use transport::{InboundTransport, Transport, TransportError};
