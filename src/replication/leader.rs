//! Leader Node Implementation
//!
//! Accepts writes, applies them locally, and fans them out to every
//! follower. The caller is released as soon as `write_quorum` followers have
//! confirmed; slower attempts keep running in the background and apply the
//! write whenever they finish.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::client::{DelayPolicy, ReplicationClient};
use super::protocol::{as_millis_f64, ReplicationOutcome, WriteRequest, WriteResult};
use crate::config::ReplicationConfig;
use crate::error::{Error, Result};
use crate::store::KvStore;

/// Semi-synchronous write coordinator running on the leader
pub struct QuorumCoordinator {
    /// Leader's local store
    store: Arc<KvStore>,
    /// Client used for every replication attempt
    client: ReplicationClient,
    /// Follower addresses, in dispatch order
    followers: Vec<String>,
    /// Follower confirmations required beyond the leader
    write_quorum: usize,
    /// Per-follower artificial delays
    delays: DelayPolicy,
}

impl QuorumCoordinator {
    /// Create a coordinator with an empty leader store
    pub fn new(
        client: ReplicationClient,
        followers: Vec<String>,
        write_quorum: usize,
        delays: DelayPolicy,
    ) -> Self {
        Self {
            store: Arc::new(KvStore::new()),
            client,
            followers,
            write_quorum,
            delays,
        }
    }

    /// Create an HTTP-backed coordinator from configuration
    pub fn from_config(config: &ReplicationConfig) -> Result<Self> {
        let client = ReplicationClient::http(config.timeout())?;
        Ok(Self::new(
            client,
            config.followers.clone(),
            config.write_quorum,
            DelayPolicy::Uniform(config.delay_range()),
        ))
    }

    pub fn store(&self) -> &Arc<KvStore> {
        &self.store
    }

    pub fn followers(&self) -> &[String] {
        &self.followers
    }

    pub fn write_quorum(&self) -> usize {
        self.write_quorum
    }

    /// Accept a client write.
    ///
    /// The leader store is updated before anything is dispatched. Individual
    /// replication failures only reduce the confirmation count; an unmet
    /// quorum is reported through `quorum_met`, not as an error.
    pub async fn write(&self, key: String, value: String) -> Result<WriteResult> {
        if key.is_empty() {
            return Err(Error::InvalidRequest("key must not be empty".into()));
        }

        let started = Instant::now();
        self.store.apply(key.clone(), value.clone()).await;
        let request = Arc::new(WriteRequest { key, value });
        let required = self.write_quorum;

        // Nothing to wait for: either no followers, or no confirmations needed
        if self.followers.is_empty() || required == 0 {
            if !self.followers.is_empty() {
                self.dispatch_detached(&request);
            }
            let quorum_met = required == 0;
            if !quorum_met {
                tracing::warn!(
                    "Write quorum not met for key '{}': no followers configured, needed {}",
                    request.key,
                    required
                );
            }
            return Ok(self.finish(&request, 0, quorum_met, started, Vec::new()));
        }

        let mut completions = self.dispatch(&request);
        let mut outcomes = Vec::with_capacity(self.followers.len());
        let mut successes = 0usize;

        // Completion order, not dispatch order. When required > followers this
        // only ends once every attempt has reported.
        while let Some(outcome) = completions.recv().await {
            if outcome.success {
                successes += 1;
            }
            outcomes.push(outcome);
            if successes >= required {
                break;
            }
        }

        let quorum_met = successes >= required;
        if quorum_met {
            tracing::debug!(
                "Quorum {} met for key '{}': {} followers + leader, {} of {} responses received",
                required,
                request.key,
                successes,
                outcomes.len(),
                self.followers.len()
            );
        } else {
            tracing::warn!(
                "Write quorum not met for key '{}': got {} follower confirmations, needed {}",
                request.key,
                successes,
                required
            );
        }

        Ok(self.finish(&request, successes, quorum_met, started, outcomes))
    }

    /// Start one attempt per follower, feeding a single completion channel.
    ///
    /// The tasks are not tracked; dropping the receiver leaves them running.
    fn dispatch(&self, request: &Arc<WriteRequest>) -> mpsc::Receiver<ReplicationOutcome> {
        let (tx, rx) = mpsc::channel(self.followers.len().max(1));
        let delays = self.delays.delays(self.followers.len());

        for (follower, delay) in self.followers.iter().zip(delays) {
            let client = self.client.clone();
            let follower = follower.clone();
            let request = Arc::clone(request);
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = client.send(&follower, &request, delay).await;
                // The coordinator may already have answered the client
                let _ = tx.send(outcome).await;
            });
        }

        rx
    }

    /// Fire-and-forget replication to every follower
    fn dispatch_detached(&self, request: &Arc<WriteRequest>) {
        let delays = self.delays.delays(self.followers.len());

        for (follower, delay) in self.followers.iter().zip(delays) {
            let client = self.client.clone();
            let follower = follower.clone();
            let request = Arc::clone(request);
            tokio::spawn(async move {
                let outcome = client.send(&follower, &request, delay).await;
                tracing::trace!(
                    "Background replication to {} finished: success={}",
                    outcome.follower,
                    outcome.success
                );
            });
        }
    }

    fn finish(
        &self,
        request: &WriteRequest,
        successes: usize,
        quorum_met: bool,
        started: Instant,
        replication_results: Vec<ReplicationOutcome>,
    ) -> WriteResult {
        WriteResult {
            key: request.key.clone(),
            value: request.value.clone(),
            confirmations: successes + 1,
            quorum_met,
            latency_ms: as_millis_f64(started.elapsed()),
            replication_results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::replication::client::{DelayRange, ReplicaTransport};
    use crate::replication::protocol::{FailureKind, ReplicateAck, ReplicationFailure};
    use crate::replication::FollowerNode;

    /// In-process transport delivering straight to follower nodes
    #[derive(Default)]
    struct LocalTransport {
        followers: HashMap<String, Arc<FollowerNode>>,
        down: HashSet<String>,
        hung: HashSet<String>,
        /// Extra in-flight time per (follower, value)
        lag: HashMap<(String, String), Duration>,
    }

    #[async_trait]
    impl ReplicaTransport for LocalTransport {
        async fn replicate(
            &self,
            follower: &str,
            request: &WriteRequest,
        ) -> std::result::Result<ReplicateAck, ReplicationFailure> {
            if self.down.contains(follower) {
                return Err(ReplicationFailure::new(
                    FailureKind::ConnectionError,
                    "connection refused",
                ));
            }
            if self.hung.contains(follower) {
                std::future::pending::<()>().await;
            }
            if let Some(lag) = self.lag.get(&(follower.to_string(), request.value.clone())) {
                tokio::time::sleep(*lag).await;
            }
            match self.followers.get(follower) {
                Some(node) => Ok(node.replicate(request.clone()).await),
                None => Err(ReplicationFailure::new(FailureKind::ConnectionError, "unknown follower")),
            }
        }
    }

    struct Cluster {
        leader: Arc<QuorumCoordinator>,
        followers: Vec<Arc<FollowerNode>>,
    }

    impl Cluster {
        fn new(count: usize, write_quorum: usize, delays: DelayPolicy) -> Self {
            Self::with_faults(count, write_quorum, delays, &[], &[])
        }

        fn with_faults(
            count: usize,
            write_quorum: usize,
            delays: DelayPolicy,
            down: &[usize],
            hung: &[usize],
        ) -> Self {
            Self::build(count, write_quorum, delays, |names| LocalTransport {
                down: down.iter().map(|i| names[*i].clone()).collect(),
                hung: hung.iter().map(|i| names[*i].clone()).collect(),
                ..Default::default()
            })
        }

        /// Followers where each listed `(follower index, value)` takes `ms` in flight
        fn with_lag(count: usize, write_quorum: usize, lag: &[(usize, &str, u64)]) -> Self {
            Self::build(count, write_quorum, DelayPolicy::default(), |names| LocalTransport {
                lag: lag
                    .iter()
                    .map(|(i, value, ms)| {
                        ((names[*i].clone(), value.to_string()), Duration::from_millis(*ms))
                    })
                    .collect(),
                ..Default::default()
            })
        }

        fn build(
            count: usize,
            write_quorum: usize,
            delays: DelayPolicy,
            transport: impl FnOnce(&[String]) -> LocalTransport,
        ) -> Self {
            let followers: Vec<Arc<FollowerNode>> = (1..=count)
                .map(|i| Arc::new(FollowerNode::new(format!("follower{}", i))))
                .collect();
            let names: Vec<String> = followers.iter().map(|f| f.follower_id().to_string()).collect();

            let transport = LocalTransport {
                followers: followers
                    .iter()
                    .map(|f| (f.follower_id().to_string(), Arc::clone(f)))
                    .collect(),
                ..transport(&names)
            };
            let client = ReplicationClient::new(Arc::new(transport), Duration::from_secs(5));
            let leader = Arc::new(QuorumCoordinator::new(client, names, write_quorum, delays));

            Self { leader, followers }
        }

        async fn follower_value(&self, index: usize, key: &str) -> Option<String> {
            self.followers[index].store().read(key).await
        }
    }

    fn fixed(ms: &[u64]) -> DelayPolicy {
        DelayPolicy::Fixed(ms.iter().map(|m| Duration::from_millis(*m)).collect())
    }

    #[tokio::test(start_paused = true)]
    async fn test_standalone_leader() {
        let cluster = Cluster::new(0, 0, DelayPolicy::default());
        let result = cluster.leader.write("a".into(), "1".into()).await.unwrap();

        assert!(result.quorum_met);
        assert_eq!(result.confirmations, 1);
        assert!(result.replication_results.is_empty());
        assert!(result.latency_ms < 1.0);
        assert_eq!(cluster.leader.store().read("a").await.as_deref(), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_followers_with_positive_quorum() {
        let cluster = Cluster::new(0, 1, DelayPolicy::default());
        let result = cluster.leader.write("a".into(), "1".into()).await.unwrap();

        assert!(!result.quorum_met);
        assert_eq!(result.confirmations, 1);
        assert_eq!(cluster.leader.store().read("a").await.as_deref(), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_quorum_replicates_in_background() {
        let cluster = Cluster::new(3, 0, fixed(&[50, 100, 150]));
        let result = cluster.leader.write("a".into(), "1".into()).await.unwrap();

        assert!(result.quorum_met);
        assert_eq!(result.confirmations, 1);
        assert!(result.replication_results.is_empty());
        assert!(result.latency_ms < 1.0);
        assert_eq!(cluster.follower_value(0, "a").await, None);

        tokio::time::sleep(Duration::from_millis(200)).await;
        for i in 0..3 {
            assert_eq!(cluster.follower_value(i, "a").await.as_deref(), Some("1"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_once_quorum_reached() {
        let cluster = Cluster::new(3, 2, fixed(&[10, 10, 500]));
        let result = cluster.leader.write("a".into(), "1".into()).await.unwrap();

        assert!(result.quorum_met);
        assert_eq!(result.confirmations, 3);
        assert_eq!(result.replication_results.len(), 2);
        assert!(result.latency_ms >= 10.0 && result.latency_ms < 20.0);

        // The slow follower has not applied the write yet
        assert_eq!(cluster.follower_value(2, "a").await, None);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(cluster.follower_value(2, "a").await.as_deref(), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_completion_order() {
        let cluster = Cluster::new(3, 3, fixed(&[300, 100, 200]));
        let result = cluster.leader.write("a".into(), "1".into()).await.unwrap();

        let order: Vec<&str> = result
            .replication_results
            .iter()
            .map(|o| o.follower.as_str())
            .collect();
        assert_eq!(order, vec!["follower2", "follower3", "follower1"]);
        assert_eq!(result.confirmations, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_quorum_waits_for_all() {
        let cluster = Cluster::new(3, 4, fixed(&[10, 50, 500]));
        let result = cluster.leader.write("a".into(), "1".into()).await.unwrap();

        assert!(!result.quorum_met);
        assert_eq!(result.confirmations, 4);
        assert_eq!(result.replication_results.len(), 3);
        assert!(result.latency_ms >= 500.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_follower_does_not_abort_round() {
        let cluster = Cluster::with_faults(3, 2, fixed(&[0, 10, 20]), &[0], &[]);
        let result = cluster.leader.write("a".into(), "1".into()).await.unwrap();

        assert!(result.quorum_met);
        assert_eq!(result.confirmations, 3);
        assert_eq!(result.replication_results.len(), 3);

        let failed = &result.replication_results[0];
        assert!(!failed.success);
        assert_eq!(failed.error_kind, Some(FailureKind::ConnectionError));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_count_as_non_confirmation() {
        let cluster = Cluster::with_faults(3, 3, fixed(&[0, 0, 0]), &[], &[1]);
        let result = cluster.leader.write("a".into(), "1".into()).await.unwrap();

        assert!(!result.quorum_met);
        assert_eq!(result.confirmations, 3);
        assert!(result.latency_ms >= 5000.0);

        let timed_out: Vec<_> = result
            .replication_results
            .iter()
            .filter(|o| o.error_kind == Some(FailureKind::Timeout))
            .collect();
        assert_eq!(timed_out.len(), 1);
        assert_eq!(timed_out[0].follower, "follower2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_key_rejected() {
        let cluster = Cluster::new(1, 1, DelayPolicy::default());
        let err = cluster.leader.write(String::new(), "1".into()).await.unwrap_err();

        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(cluster.leader.store().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_identical_writes_settle() {
        let cluster = Cluster::new(3, 1, DelayPolicy::Uniform(DelayRange::new(
            Duration::ZERO,
            Duration::from_millis(100),
        )));
        cluster.leader.write("k".into(), "v".into()).await.unwrap();
        cluster.leader.write("k".into(), "v".into()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(cluster.leader.store().read("k").await.as_deref(), Some("v"));
        for i in 0..3 {
            assert_eq!(cluster.follower_value(i, "k").await.as_deref(), Some("v"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_writes_settle_to_submitted_values() {
        let cluster = Cluster::new(5, 2, DelayPolicy::Uniform(DelayRange::new(
            Duration::ZERO,
            Duration::from_millis(200),
        )));
        let submitted: Vec<String> = (0..20).map(|i| format!("value-{}", i)).collect();

        let writes = submitted.iter().cloned().map(|value| {
            let leader = Arc::clone(&cluster.leader);
            tokio::spawn(async move { leader.write("race".into(), value).await })
        });
        for result in futures::future::join_all(writes).await {
            assert!(result.unwrap().unwrap().quorum_met);
        }

        tokio::time::sleep(Duration::from_millis(500)).await;

        let leader_value = cluster.leader.store().read("race").await.unwrap();
        assert!(submitted.contains(&leader_value));
        for i in 0..5 {
            // Each node holds some submitted value; nodes need not agree
            let value = cluster.follower_value(i, "race").await.unwrap();
            assert!(submitted.contains(&value));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_writes_can_leave_followers_diverged() {
        // Each write reaches the two followers in opposite order
        let cluster = Cluster::with_lag(2, 1, &[(0, "1", 10), (0, "2", 100), (1, "1", 100), (1, "2", 10)]);

        let first = Arc::clone(&cluster.leader);
        let second = Arc::clone(&cluster.leader);
        let (r1, r2) = tokio::join!(
            first.write("k".into(), "1".into()),
            second.write("k".into(), "2".into())
        );
        assert!(r1.unwrap().quorum_met);
        assert!(r2.unwrap().quorum_met);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(cluster.follower_value(0, "k").await.as_deref(), Some("2"));
        assert_eq!(cluster.follower_value(1, "k").await.as_deref(), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_delays_diverge_followers() {
        let cluster = Cluster::new(5, 1, DelayPolicy::Uniform(DelayRange::new(
            Duration::ZERO,
            Duration::from_millis(500),
        )));

        let mut diverged = 0;
        for round in 0..20 {
            let key = format!("round-{}", round);
            let writes = (0..5).map(|i| {
                let leader = Arc::clone(&cluster.leader);
                let key = key.clone();
                tokio::spawn(async move { leader.write(key, format!("v{}", i)).await })
            });
            for result in futures::future::join_all(writes).await {
                let result = result.unwrap().unwrap();
                assert!(result.confirmations <= 6);
            }

            tokio::time::sleep(Duration::from_millis(600)).await;

            let mut values = HashSet::new();
            for i in 0..5 {
                values.insert(cluster.follower_value(i, &key).await.unwrap());
            }
            if values.len() > 1 {
                diverged += 1;
            }
        }

        // Replication is not serialized, so some rounds must end in disagreement
        assert!(diverged > 0, "followers agreed in all 20 rounds");
    }
}
