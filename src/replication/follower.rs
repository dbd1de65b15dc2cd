//! Follower Node Implementation
//!
//! Applies writes pushed by the leader to the local store. A follower has no
//! coordination logic: whatever arrives last for a key wins on this node.

use std::sync::Arc;

use chrono::Utc;

use super::protocol::{ReplicateAck, WriteRequest};
use crate::store::KvStore;

/// Follower node state
pub struct FollowerNode {
    /// Follower identity reported in acks and health
    follower_id: String,
    /// Local store
    store: Arc<KvStore>,
}

impl FollowerNode {
    /// Create a follower with an empty store
    pub fn new(follower_id: impl Into<String>) -> Self {
        Self {
            follower_id: follower_id.into(),
            store: Arc::new(KvStore::new()),
        }
    }

    pub fn follower_id(&self) -> &str {
        &self.follower_id
    }

    pub fn store(&self) -> &Arc<KvStore> {
        &self.store
    }

    /// Apply a replicated write
    pub async fn replicate(&self, request: WriteRequest) -> ReplicateAck {
        let arrived = Utc::now();
        let timestamp = arrived.timestamp_micros() as f64 / 1_000_000.0;

        self.store.apply(request.key.clone(), request.value.clone()).await;

        tracing::info!(
            "[RACE] Follower {} replicated key='{}' at t={:.3} (current store size: {})",
            self.follower_id,
            request.key,
            timestamp,
            self.store.len().await
        );

        ReplicateAck {
            success: true,
            key: request.key,
            value: request.value,
            follower_id: self.follower_id.clone(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replicate_applies_and_acks() {
        let follower = FollowerNode::new("follower1");
        let ack = follower.replicate(WriteRequest::new("a", "1")).await;

        assert!(ack.success);
        assert_eq!(ack.follower_id, "follower1");
        assert_eq!(ack.key, "a");
        assert!(ack.timestamp > 0.0);
        assert_eq!(follower.store().read("a").await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_last_arrival_wins() {
        let follower = FollowerNode::new("follower1");
        follower.replicate(WriteRequest::new("a", "late-issued")).await;
        follower.replicate(WriteRequest::new("a", "early-issued")).await;

        assert_eq!(follower.store().read("a").await.as_deref(), Some("early-issued"));
    }
}
