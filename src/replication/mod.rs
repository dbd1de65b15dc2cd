//! Replication Module
//!
//! Semi-synchronous replication from the leader to a fixed set of
//! followers: the leader applies locally, fans out to every follower, and
//! answers once `write_quorum` followers have confirmed.

pub mod protocol;
pub mod client;
mod leader;
mod follower;

pub use protocol::{FailureKind, ReplicateAck, ReplicationOutcome, WriteRequest, WriteResult};
pub use client::{DelayPolicy, DelayRange, HttpTransport, ReplicaTransport, ReplicationClient};
pub use leader::QuorumCoordinator;
pub use follower::FollowerNode;
