//! Job definition and execution engine for Floodgate.
//!
//! This crate defines the "ports" (the [`step::JobSubmitter`] and
//! [`step::TargetCaller`] traits) that the client layer implements. It
//! depends only on `floodgate-types` -- never on an HTTP stack.
//!
//! The pieces:
//! - [`event`] -- the concurrent event store correlating webhook arrivals
//!   with registered continuations, and the receiver binding seam.
//! - [`signature`] -- HMAC-SHA256 webhook signature verification.
//! - [`step`] -- the job builder, the executor with its two strategies,
//!   and the `auto_forward` adapter.
//! - [`dispatch`] -- the bounded pool that runs callbacks and
//!   continuations off the hot path.

pub mod dispatch;
pub mod event;
pub mod signature;
pub mod step;
