//! QuorumKV - Semi-Synchronous Quorum Replication
//!
//! Server binary: runs a leader, a follower, or a set of followers in one
//! process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quorumkv::api::HttpServer;
use quorumkv::config::{ConfigOverrides, KvConfig};
use quorumkv::error::{Error, Result};
use quorumkv::replication::{FollowerNode, QuorumCoordinator};

/// Follower identity when neither the flag, the environment nor the file sets one
const DEFAULT_FOLLOWER_ID: &str = "follower1";

/// QuorumKV - single-leader key-value store with quorum replication
#[derive(Parser)]
#[command(name = "quorumkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (optional; defaults apply without it)
    #[arg(short, long, env = "QUORUMKV_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the leader
    Leader {
        /// HTTP port
        #[arg(long, env = "PORT")]
        port: Option<u16>,

        /// Comma-separated follower addresses
        #[arg(long, env = "FOLLOWERS", value_delimiter = ',')]
        followers: Option<Vec<String>>,

        /// Follower confirmations required before answering a write
        #[arg(long, env = "WRITE_QUORUM")]
        write_quorum: Option<usize>,

        /// Minimum artificial replication delay (ms)
        #[arg(long, env = "MIN_DELAY")]
        min_delay: Option<u64>,

        /// Maximum artificial replication delay (ms)
        #[arg(long, env = "MAX_DELAY")]
        max_delay: Option<u64>,
    },

    /// Start a follower
    Follower {
        /// HTTP port
        #[arg(long, env = "PORT")]
        port: Option<u16>,

        /// Follower identity
        #[arg(long, env = "FOLLOWER_ID")]
        follower_id: Option<String>,
    },

    /// Start several followers in this process
    Followers {
        /// Number of followers
        #[arg(long, default_value_t = 5)]
        count: u16,

        /// Port of the first follower; the rest use consecutive ports
        #[arg(long, default_value_t = 8081)]
        base_port: u16,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "quorumkv.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { output } = &cli.command {
        init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
        return run_init(output);
    }

    let config = load_config(cli.config.as_deref())?;
    init_logging(
        cli.log_level.as_deref().unwrap_or(&config.logging.level),
        &config.logging.format,
    );

    match cli.command {
        Commands::Leader {
            port,
            followers,
            write_quorum,
            min_delay,
            max_delay,
        } => {
            let overrides = ConfigOverrides {
                port,
                followers,
                write_quorum,
                min_delay_ms: min_delay,
                max_delay_ms: max_delay,
                ..Default::default()
            };
            run_leader(config, overrides).await
        }
        Commands::Follower { port, follower_id } => {
            let overrides = ConfigOverrides {
                node_id: follower_id,
                port,
                ..Default::default()
            };
            run_follower(config, overrides).await
        }
        Commands::Followers { count, base_port } => run_followers(count, base_port).await,
        Commands::Validate => run_validate(config),
        Commands::Init { .. } => Ok(()),
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "compact" {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Load the config file if one was given, otherwise start from defaults
fn load_config(path: Option<&Path>) -> Result<KvConfig> {
    match path {
        Some(path) => KvConfig::from_file(path).map_err(|e| {
            eprintln!("Failed to load configuration from {:?}: {}", path, e);
            e
        }),
        None => Ok(KvConfig::default()),
    }
}

/// Start the leader
async fn run_leader(mut config: KvConfig, overrides: ConfigOverrides) -> Result<()> {
    config.apply_overrides(overrides);
    config.validate()?;

    let replication = &config.replication;
    tracing::info!(
        "Leader initialized with {} followers: {:?}",
        replication.followers.len(),
        replication.followers
    );
    tracing::info!(
        "Write quorum: {}, Delay range: [{}, {}]ms, Timeout: {}ms",
        replication.write_quorum,
        replication.min_delay_ms,
        replication.max_delay_ms,
        replication.timeout_ms
    );
    if !replication.quorum_reachable() {
        tracing::warn!(
            "Write quorum {} exceeds follower count {}; every write will report quorum_met=false",
            replication.write_quorum,
            replication.followers.len()
        );
    }

    let coordinator = Arc::new(QuorumCoordinator::from_config(replication)?);
    let server = HttpServer::leader(config.node.bind_address.clone(), coordinator);
    server.start().await
}

/// Start a follower
async fn run_follower(mut config: KvConfig, overrides: ConfigOverrides) -> Result<()> {
    config.apply_overrides(overrides);
    config.validate()?;

    let follower_id = config.node.id_or(DEFAULT_FOLLOWER_ID).to_string();
    tracing::info!(
        "Follower {} initialized on {}",
        follower_id,
        config.node.bind_address
    );

    let follower = Arc::new(FollowerNode::new(follower_id));
    let server = HttpServer::follower(config.node.bind_address.clone(), follower);
    server.start().await
}

/// Start `count` followers on consecutive ports
async fn run_followers(count: u16, base_port: u16) -> Result<()> {
    let servers: Vec<HttpServer> = follower_addresses(count, base_port)?
        .into_iter()
        .map(|(follower_id, bind_address)| {
            tracing::info!("Starting follower {} on {}", follower_id, bind_address);
            HttpServer::follower(bind_address, Arc::new(FollowerNode::new(follower_id)))
        })
        .collect();

    futures::future::try_join_all(servers.iter().map(|server| server.start())).await?;
    tracing::info!("Shutting down followers...");
    Ok(())
}

/// Identity and bind address for each of `count` followers on consecutive ports
fn follower_addresses(count: u16, base_port: u16) -> Result<Vec<(String, String)>> {
    (0..count)
        .map(|i| {
            let port = base_port.checked_add(i).ok_or_else(|| {
                Error::Config(format!("port range {}+{} exceeds 65535", base_port, count))
            })?;
            Ok((format!("follower{}", i + 1), format!("0.0.0.0:{}", port)))
        })
        .collect()
}

/// Write a sample configuration file
fn run_init(output: &Path) -> Result<()> {
    let mut config = KvConfig::default();
    config.node.id = Some("leader".to_string());
    config.replication.followers = (8081..=8085)
        .map(|port| format!("http://localhost:{}", port))
        .collect();
    config.replication.write_quorum = 3;

    let content = format!(
        "# QuorumKV Configuration\n\
         # Environment variables (FOLLOWERS, WRITE_QUORUM, MIN_DELAY, MAX_DELAY,\n\
         # PORT, FOLLOWER_ID) override the values below.\n\n{}",
        config.to_toml()?
    );

    std::fs::write(output, content)?;
    println!("Configuration file created: {}", output.display());
    println!("Then start with: quorumkv --config {} leader", output.display());

    Ok(())
}

/// Validate configuration file
fn run_validate(config: KvConfig) -> Result<()> {
    config.validate()?;
    println!("✓ Configuration is valid");
    println!("  Node ID: {}", config.node.id.as_deref().unwrap_or("(unset)"));
    println!("  Bind Address: {}", config.node.bind_address);
    println!("  Followers: {}", config.replication.followers.len());
    println!("  Write Quorum: {}", config.replication.write_quorum);
    println!(
        "  Delay Range: [{}, {}]ms",
        config.replication.min_delay_ms, config.replication.max_delay_ms
    );
    if !config.replication.quorum_reachable() {
        println!("  ! Write quorum exceeds follower count; quorum can never be met");
    }
    Ok(())
}
