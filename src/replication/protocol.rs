//! Replication Protocol
//!
//! Request, acknowledgement and result types exchanged between the leader,
//! its followers and clients. All of them travel as JSON.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single key/value write, as sent by clients to `/write` and by the
/// leader to `/replicate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub key: String,
    pub value: String,
}

impl WriteRequest {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Follower acknowledgement of an applied replication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateAck {
    pub success: bool,
    pub key: String,
    pub value: String,
    pub follower_id: String,
    /// Arrival time at the follower, fractional Unix seconds
    pub timestamp: f64,
}

/// Why a replication attempt did not confirm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The call did not finish within the replication ceiling
    Timeout,
    /// The follower could not be reached
    ConnectionError,
    /// The follower answered but did not report a successful apply
    Rejected,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::ConnectionError => write!(f, "connection-error"),
            FailureKind::Rejected => write!(f, "rejected"),
        }
    }
}

/// Failed replication call, as reported by a transport
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ReplicationFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ReplicationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result of one replication attempt to one follower.
///
/// Produced exactly once per dispatch and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationOutcome {
    pub follower: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ReplicateAck>,
    /// Time from dispatch (including the artificial delay) to completion
    pub latency_ms: f64,
    pub arrived_at: DateTime<Utc>,
}

impl ReplicationOutcome {
    pub fn confirmed(follower: String, ack: ReplicateAck, elapsed: Duration) -> Self {
        Self {
            follower,
            success: true,
            error_kind: None,
            error: None,
            result: Some(ack),
            latency_ms: as_millis_f64(elapsed),
            arrived_at: Utc::now(),
        }
    }

    pub fn failed(follower: String, failure: ReplicationFailure, elapsed: Duration) -> Self {
        Self {
            follower,
            success: false,
            error_kind: Some(failure.kind),
            error: Some(failure.message),
            result: None,
            latency_ms: as_millis_f64(elapsed),
            arrived_at: Utc::now(),
        }
    }
}

/// Outcome of a client write as seen at the moment the leader answered.
///
/// `replication_results` is a snapshot: followers that had not answered by
/// then may still apply the write afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResult {
    pub key: String,
    pub value: String,
    /// Nodes known to hold the write, the leader included
    pub confirmations: usize,
    pub quorum_met: bool,
    pub latency_ms: f64,
    pub replication_results: Vec<ReplicationOutcome>,
}

pub(crate) fn as_millis_f64(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
