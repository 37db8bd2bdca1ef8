//! # courier-messaging
//!
//! Outbound and inbound message plumbing: the retry-until-expiry send
//! scheduler, the message sender that resolves routing entries and stamps
//! reply-to addresses, and the admission-controlled inbound skeleton that
//! throttles request intake on a shared transport connection.

pub mod admission;
pub mod mock;
pub mod scheduler;
pub mod sender;
pub mod skeleton;

pub use admission::{AdmissionConfig, AdmissionControl, IntakeState};
pub use mock::MockTransport;
pub use scheduler::{MessageJob, SchedulerConfig, SendScheduler};
pub use sender::MessageSender;
pub use skeleton::{MessageProcessor, SharedSubscriptionSkeleton};
