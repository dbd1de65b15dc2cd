//! KvCtl - Command line client for QuorumKV clusters
//!
//! Usage:
//!   kvctl write <key> <value>   - Write through the leader
//!   kvctl read <key>            - Read from a node
//!   kvctl status                - Show a node's health
//!   kvctl store                 - Dump a node's store
//!   kvctl check <key>           - Compare a key across the leader and followers

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use quorumkv::api::{ErrorResponse, HealthResponse, ReadResponse, WriteResponse};
use quorumkv::replication::client::node_url;

/// QuorumKV Cluster Control Tool
#[derive(Parser)]
#[command(name = "kvctl")]
#[command(about = "Write to and inspect QuorumKV clusters", long_about = None)]
struct Cli {
    /// Leader address
    #[arg(short, long, env = "LEADER_URL", default_value = "http://localhost:8080")]
    leader: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a key-value pair through the leader
    Write { key: String, value: String },
    /// Read a key from a node (defaults to the leader)
    Read {
        key: String,
        #[arg(short, long)]
        node: Option<String>,
    },
    /// Show health of a node (defaults to the leader)
    Status {
        #[arg(short, long)]
        node: Option<String>,
    },
    /// Dump the full store of a node (defaults to the leader)
    Store {
        #[arg(short, long)]
        node: Option<String>,
    },
    /// Read a key from every node and report whether they agree
    Check {
        key: String,
        /// Follower addresses (defaults to the leader's follower list)
        #[arg(long, value_delimiter = ',')]
        followers: Option<Vec<String>>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let result = match &cli.command {
        Commands::Write { key, value } => write(&client, &cli.leader, key, value).await,
        Commands::Read { key, node } => {
            read(&client, node.as_deref().unwrap_or(&cli.leader), key).await
        }
        Commands::Status { node } => status(&client, node.as_deref().unwrap_or(&cli.leader)).await,
        Commands::Store { node } => {
            dump_store(&client, node.as_deref().unwrap_or(&cli.leader)).await
        }
        Commands::Check { key, followers } => {
            check(&client, &cli.leader, followers.clone(), key).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

// ============ Commands ============

async fn write(client: &reqwest::Client, leader: &str, key: &str, value: &str) -> Result<()> {
    let response = client
        .post(node_url(leader, "/write"))
        .json(&serde_json::json!({ "key": key, "value": value }))
        .send()
        .await
        .with_context(|| format!("failed to reach leader at {}", leader))?;

    if !response.status().is_success() {
        bail!("write failed: {}", api_error(response).await);
    }

    let result: WriteResponse = response.json().await?;
    let result = result.result;

    println!();
    println!("Key:           {}", result.key);
    println!("Value:         {}", result.value);
    println!("Confirmations: {}", result.confirmations);
    println!("Quorum Met:    {}", if result.quorum_met { "yes" } else { "NO" });
    println!("Latency:       {:.2}ms", result.latency_ms);
    println!();

    if !result.replication_results.is_empty() {
        println!("{:<30} {:<8} {:>12}  {}", "FOLLOWER", "OK", "LATENCY", "ERROR");
        println!("{}", "-".repeat(70));
        for outcome in &result.replication_results {
            println!(
                "{:<30} {:<8} {:>10.2}ms  {}",
                outcome.follower,
                outcome.success,
                outcome.latency_ms,
                outcome.error.as_deref().unwrap_or("")
            );
        }
        println!();
    }

    Ok(())
}

async fn read(client: &reqwest::Client, node: &str, key: &str) -> Result<()> {
    match read_value(client, node, key).await? {
        Some(value) => println!("{}", value),
        None => bail!("key '{}' not found on {}", key, node),
    }
    Ok(())
}

async fn status(client: &reqwest::Client, node: &str) -> Result<()> {
    let health: HealthResponse = get_json(client, node, "/health").await?;

    println!();
    println!("Node Status");
    println!("===========");
    println!();
    println!("Address:      {}", node);
    println!("Status:       {}", health.status);
    println!("Role:         {}", health.role);
    if let Some(id) = &health.follower_id {
        println!("Follower ID:  {}", id);
    }
    if let Some(quorum) = health.write_quorum {
        println!("Write Quorum: {}", quorum);
    }
    if let Some(followers) = &health.followers {
        println!("Followers:    {}", followers.len());
        for follower in followers {
            println!("  - {}", follower);
        }
    }
    println!("Store Size:   {}", health.store_size);
    println!();

    Ok(())
}

async fn dump_store(client: &reqwest::Client, node: &str) -> Result<()> {
    let store: std::collections::BTreeMap<String, String> = get_json(client, node, "/store").await?;
    println!("{}", serde_json::to_string_pretty(&store)?);
    Ok(())
}

async fn check(
    client: &reqwest::Client,
    leader: &str,
    followers: Option<Vec<String>>,
    key: &str,
) -> Result<()> {
    let followers = match followers {
        Some(followers) => followers,
        None => {
            let health: HealthResponse = get_json(client, leader, "/health").await?;
            health.followers.unwrap_or_default()
        }
    };

    let mut nodes = vec![leader.to_string()];
    nodes.extend(followers);

    let reads = nodes.iter().map(|node| read_value(client, node, key));
    let values = futures::future::join_all(reads).await;

    println!();
    println!("{:<30} {}", "NODE", "VALUE");
    println!("{}", "-".repeat(50));

    let mut seen = std::collections::BTreeSet::new();
    for (node, value) in nodes.iter().zip(&values) {
        let shown = match value {
            Ok(Some(value)) => {
                seen.insert(value.clone());
                value.clone()
            }
            Ok(None) => "(missing)".to_string(),
            Err(e) => format!("ERROR: {}", e),
        };
        println!("{:<30} {}", node, shown);
    }
    println!();

    let complete = values.iter().all(|v| matches!(v, Ok(Some(_))));
    if complete && seen.len() == 1 {
        println!("✓ All {} nodes agree", nodes.len());
    } else {
        // Divergence is an expected outcome of last-writer-wins replication
        println!("! Nodes disagree: {} distinct values", seen.len());
    }
    println!();

    Ok(())
}

// ============ Helpers ============

async fn read_value(client: &reqwest::Client, node: &str, key: &str) -> Result<Option<String>> {
    let response = client
        .get(node_url(node, "/read"))
        .query(&[("key", key)])
        .send()
        .await
        .with_context(|| format!("failed to reach {}", node))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        bail!("read failed: {}", api_error(response).await);
    }

    let body: ReadResponse = response.json().await?;
    Ok(Some(body.value))
}

async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    node: &str,
    path: &str,
) -> Result<T> {
    let response = client
        .get(node_url(node, path))
        .send()
        .await
        .with_context(|| format!("failed to reach {}", node))?;

    if !response.status().is_success() {
        bail!("API error: {}", api_error(response).await);
    }

    Ok(response.json().await?)
}

async fn api_error(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => format!("{} ({}, {})", body.error, body.code, status),
        Err(_) => status.to_string(),
    }
}
