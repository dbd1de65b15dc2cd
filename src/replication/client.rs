//! Replication Client
//!
//! Delivers one write to one follower. Every call waits an artificial delay
//! first (standing in for network variability), then makes a single attempt
//! bounded by a fixed ceiling. There are no retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::{timeout, Instant};

use super::protocol::{FailureKind, ReplicateAck, ReplicationFailure, ReplicationOutcome, WriteRequest};

/// Inclusive range the per-follower delay is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    /// Create a range; bounds are swapped if given in the wrong order
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Range that always yields `delay`
    pub fn fixed(delay: Duration) -> Self {
        Self { min: delay, max: delay }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw a delay with millisecond granularity
    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if min == max {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// How delays are assigned to followers for one write round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelayPolicy {
    /// Independent random draw per follower per write
    Uniform(DelayRange),
    /// Same delay for follower `i` on every write; followers past the end
    /// of the list reuse the last entry
    Fixed(Vec<Duration>),
}

impl DelayPolicy {
    /// Delays for `count` followers, in follower order
    pub fn delays(&self, count: usize) -> Vec<Duration> {
        match self {
            DelayPolicy::Uniform(range) => (0..count).map(|_| range.sample()).collect(),
            DelayPolicy::Fixed(delays) => (0..count)
                .map(|i| delays.get(i).or(delays.last()).copied().unwrap_or_default())
                .collect(),
        }
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        DelayPolicy::Uniform(DelayRange::fixed(Duration::ZERO))
    }
}

/// Transport used to reach a follower's replicate endpoint
#[async_trait]
pub trait ReplicaTransport: Send + Sync {
    /// Perform one replication call, without delay or timeout handling
    async fn replicate(
        &self,
        follower: &str,
        request: &WriteRequest,
    ) -> std::result::Result<ReplicateAck, ReplicationFailure>;
}

/// Build the URL for `path` on a node given as `host:port` or a base URL
pub fn node_url(address: &str, path: &str) -> String {
    let base = address.trim().trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{}{}", base, path)
    } else {
        format!("http://{}{}", base, path)
    }
}

/// JSON-over-HTTP transport talking to `POST /replicate`
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport whose requests give up after `request_timeout`
    pub fn new(request_timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ReplicaTransport for HttpTransport {
    async fn replicate(
        &self,
        follower: &str,
        request: &WriteRequest,
    ) -> std::result::Result<ReplicateAck, ReplicationFailure> {
        let response = self
            .client
            .post(node_url(follower, "/replicate"))
            .json(request)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReplicationFailure::new(
                FailureKind::Rejected,
                format!("Status {}", status.as_u16()),
            ));
        }

        let ack: ReplicateAck = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ReplicationFailure::new(FailureKind::Timeout, e.to_string())
            } else {
                ReplicationFailure::new(FailureKind::Rejected, format!("invalid ack: {}", e))
            }
        })?;

        if !ack.success {
            return Err(ReplicationFailure::new(
                FailureKind::Rejected,
                format!("follower {} reported failure", ack.follower_id),
            ));
        }

        Ok(ack)
    }
}

fn classify_send_error(e: reqwest::Error) -> ReplicationFailure {
    if e.is_timeout() {
        ReplicationFailure::new(FailureKind::Timeout, e.to_string())
    } else {
        ReplicationFailure::new(FailureKind::ConnectionError, e.to_string())
    }
}

/// Single-attempt replication with artificial delay and a fixed ceiling
#[derive(Clone)]
pub struct ReplicationClient {
    transport: Arc<dyn ReplicaTransport>,
    timeout: Duration,
}

impl ReplicationClient {
    pub fn new(transport: Arc<dyn ReplicaTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Client backed by [`HttpTransport`]
    pub fn http(timeout: Duration) -> crate::Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new(timeout)?), timeout))
    }

    /// Wait `delay`, then replicate `request` to `follower` once.
    ///
    /// Never fails: every problem is folded into the returned outcome.
    pub async fn send(
        &self,
        follower: &str,
        request: &WriteRequest,
        delay: Duration,
    ) -> ReplicationOutcome {
        let started = Instant::now();
        tokio::time::sleep(delay).await;

        let result = match timeout(self.timeout, self.transport.replicate(follower, request)).await {
            Ok(result) => result,
            Err(_) => Err(ReplicationFailure::new(
                FailureKind::Timeout,
                format!("no response within {}ms", self.timeout.as_millis()),
            )),
        };

        match result {
            Ok(ack) => {
                tracing::debug!(
                    "Replicated key '{}' to {} after {:?}",
                    request.key,
                    follower,
                    started.elapsed()
                );
                ReplicationOutcome::confirmed(follower.to_string(), ack, started.elapsed())
            }
            Err(failure) => {
                tracing::warn!(
                    "Replication of key '{}' to {} failed: {}",
                    request.key,
                    follower,
                    failure
                );
                ReplicationOutcome::failed(follower.to_string(), failure, started.elapsed())
            }
        }
    }
}
