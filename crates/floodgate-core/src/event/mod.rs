//! Event correlation between issued jobs and webhook arrivals.

pub mod binding;
pub mod store;

pub use binding::ReceiverBinding;
pub use store::{EventHandler, EventSnapshot, EventStore};
