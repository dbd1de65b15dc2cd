//! QuorumKV Configuration
//!
//! Startup configuration for leader and follower nodes. Values come from an
//! optional TOML file and may be overridden by environment variables or CLI
//! flags; there is no runtime reconfiguration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::replication::DelayRange;

/// Main QuorumKV configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvConfig {
    /// Node-specific configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Replication configuration (leader only)
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identity, reported by followers in acks and health
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// HTTP bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Replication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Follower addresses (`host:port` or `http://host:port`)
    #[serde(default)]
    pub followers: Vec<String>,

    /// Follower confirmations required beyond the leader's own apply
    #[serde(default = "default_write_quorum")]
    pub write_quorum: usize,

    /// Minimum artificial replication delay in milliseconds
    #[serde(default)]
    pub min_delay_ms: u64,

    /// Maximum artificial replication delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Ceiling for a single replication call in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Overrides collected from the environment or command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub node_id: Option<String>,
    pub port: Option<u16>,
    pub followers: Option<Vec<String>>,
    pub write_quorum: Option<usize>,
    pub min_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_write_quorum() -> usize {
    1
}

fn default_max_delay_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl NodeConfig {
    /// Configured identity, or `fallback` when none was given
    pub fn id_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.id.as_deref().unwrap_or(fallback)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: None,
            bind_address: default_bind_address(),
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            followers: Vec::new(),
            write_quorum: default_write_quorum(),
            min_delay_ms: 0,
            max_delay_ms: default_max_delay_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ReplicationConfig {
    /// Delay range for the uniform delay policy
    pub fn delay_range(&self) -> DelayRange {
        DelayRange::new(
            Duration::from_millis(self.min_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    /// Per-call replication ceiling
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether the configured quorum can ever be met
    pub fn quorum_reachable(&self) -> bool {
        self.write_quorum <= self.followers.len()
    }
}

impl KvConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: KvConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply environment/CLI overrides on top of file values
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(id) = overrides.node_id {
            self.node.id = Some(id);
        }
        if let Some(port) = overrides.port {
            self.node.bind_address = format!("0.0.0.0:{}", port);
        }
        if let Some(followers) = overrides.followers {
            self.replication.followers = followers
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
        }
        if let Some(quorum) = overrides.write_quorum {
            self.replication.write_quorum = quorum;
        }
        if let Some(min) = overrides.min_delay_ms {
            self.replication.min_delay_ms = min;
        }
        if let Some(max) = overrides.max_delay_ms {
            self.replication.max_delay_ms = max;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id.as_deref() == Some("") {
            return Err(crate::Error::Config("node.id cannot be empty".into()));
        }

        if self.node.bind_address.is_empty() {
            return Err(crate::Error::Config("node.bind_address cannot be empty".into()));
        }

        if self.replication.min_delay_ms > self.replication.max_delay_ms {
            return Err(crate::Error::Config(format!(
                "replication.min_delay_ms ({}) exceeds replication.max_delay_ms ({})",
                self.replication.min_delay_ms, self.replication.max_delay_ms
            )));
        }

        if self.replication.timeout_ms == 0 {
            return Err(crate::Error::Config("replication.timeout_ms must be positive".into()));
        }

        Ok(())
    }
}
