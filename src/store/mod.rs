//! In-Memory Store
//!
//! Volatile key-value map held by every node. The leader and each follower
//! own exactly one [`KvStore`]; nothing here coordinates with other nodes.

use std::collections::HashMap;
use tokio::sync::RwLock;

/// Key-value store shared by the handlers of a single node.
///
/// `apply` is a flat overwrite: the last write to arrive at this node wins.
/// Concurrent writes to the same key may land in a different order on
/// different nodes, so stores are not guaranteed to agree.
#[derive(Debug, Default)]
pub struct KvStore {
    data: RwLock<HashMap<String, String>>,
}

impl KvStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the value for `key`
    pub async fn apply(&self, key: String, value: String) {
        self.data.write().await.insert(key, value);
    }

    /// Read the current value for `key`
    pub async fn read(&self, key: &str) -> Option<String> {
        self.data.read().await.get(key).cloned()
    }

    /// Copy of the full mapping
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.data.read().await.clone()
    }

    /// Number of keys held
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Whether the store holds no keys
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}
