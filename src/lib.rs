//! QuorumKV - Semi-Synchronous Quorum Replication
//!
//! A minimal single-leader key-value store. Writes go to the leader, are
//! applied to its in-memory store, and are fanned out to a fixed set of
//! followers. The leader answers as soon as a configurable number of
//! followers have confirmed, without waiting for the rest.
//!
//! # Architecture
//!
//! - [`store`]: per-node in-memory map, last writer wins
//! - [`replication`]: quorum coordinator (leader), follower node, and the
//!   replication client with its artificial per-call delay
//! - [`api`]: HTTP surface for both roles
//! - [`config`]: startup configuration
//!
//! # Consistency
//!
//! Slow followers keep applying a write after the client has been answered,
//! and every node resolves conflicting writes by arrival order alone.
//! Concurrent writes to the same key can therefore leave followers holding
//! different values.

pub mod config;
pub mod error;
pub mod store;
pub mod replication;
pub mod api;

pub use config::KvConfig;
pub use error::{Error, Result};

