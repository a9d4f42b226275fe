//! Shared domain types for Floodgate.
//!
//! This crate contains the wire-level data model shared by the Floodgate
//! SDK crates: the recursive job payload, webhook delivery types, client
//! configuration, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror,
//! secrecy.

pub mod config;
pub mod error;
pub mod job;
pub mod webhook;
