//! WolfPeerCtl - Command line tool for the WolfPeer API
//!
//! Usage:
//!   wolfpeerctl check <key>          - Check whether a peer is configured
//!   wolfpeerctl add <key> [--ips ..] - Add a peer (allocates an address if --ips is omitted)
//!   wolfpeerctl remove <key>         - Remove a peer
//!   wolfpeerctl next-ip              - Show the next free address
//!   wolfpeerctl list                 - List peers and their allowed-IPs

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// WolfPeer Control Tool
#[derive(Parser)]
#[command(name = "wolfpeerctl")]
#[command(about = "Manage WireGuard peers through the WolfPeer API", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "wolfpeer.toml")]
    config: PathBuf,

    /// API endpoint to connect to (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a peer is configured
    Check {
        /// Peer public key
        public_key: String,
    },
    /// Add a peer
    Add {
        /// Peer public key
        public_key: String,
        /// Allowed IPs (e.g. 10.200.200.2/32); next free address when omitted
        #[arg(long)]
        ips: Option<String>,
    },
    /// Remove a peer
    Remove {
        /// Peer public key
        public_key: String,
    },
    /// Show the next free address
    NextIp {
        /// Subnet to allocate from (defaults to the server's subnet)
        #[arg(long)]
        subnet: Option<String>,
    },
    /// List peers and their allowed-IPs
    List,
}

// ============ API Response Types ============

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(rename = "allowedIPs", default)]
    allowed_ips: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AvailableIpResponse {
    #[serde(rename = "availableIP")]
    available_ip: String,
}

#[derive(Debug, Deserialize)]
struct PeerEntry {
    #[serde(rename = "publicKey")]
    public_key: String,
    #[serde(rename = "allowedIPs", default)]
    allowed_ips: Vec<String>,
}

// ============ Config ============

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    api: ApiConfig,
}

#[derive(Debug, Deserialize)]
struct ApiConfig {
    #[serde(default = "default_api_bind")]
    bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { bind_address: default_api_bind() }
    }
}

fn default_api_bind() -> String {
    "0.0.0.0:14500".to_string()
}

/// Endpoint from the config file, with 0.0.0.0 mapped to localhost
fn endpoint_from_config(path: &Path) -> String {
    let addr = std::fs::read_to_string(path)
        .ok()
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.api.bind_address)
        .unwrap_or_else(default_api_bind);

    if addr.starts_with("0.0.0.0") {
        format!("http://127.0.0.1:{}", addr.split(':').nth(1).unwrap_or("14500"))
    } else {
        format!("http://{}", addr)
    }
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let endpoint = cli
        .endpoint
        .clone()
        .unwrap_or_else(|| endpoint_from_config(&cli.config));
    let client = reqwest::Client::new();

    let result = match &cli.command {
        Commands::Check { public_key } => check_peer(&client, &endpoint, public_key).await,
        Commands::Add { public_key, ips } => add_peer(&client, &endpoint, public_key, ips.as_deref()).await,
        Commands::Remove { public_key } => remove_peer(&client, &endpoint, public_key).await,
        Commands::NextIp { subnet } => next_ip(&client, &endpoint, subnet.as_deref()).await,
        Commands::List => list_peers(&client, &endpoint).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

// ============ Commands ============

/// `{endpoint}/peer/{key}` with the key percent-encoded as one path segment
fn peer_url(endpoint: &str, public_key: &str) -> anyhow::Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(endpoint).with_context(|| format!("Invalid endpoint {}", endpoint))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Endpoint cannot be a base URL: {}", endpoint))?
        .pop_if_empty()
        .push("peer")
        .push(public_key);
    Ok(url)
}

/// Turn an error response into an error carrying the server's message
async fn api_error(response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    match response.json::<MessageResponse>().await {
        Ok(body) => match body.error {
            Some(detail) => anyhow!("{} ({}): {}", body.message, status, detail),
            None => anyhow!("{} ({})", body.message, status),
        },
        Err(_) => anyhow!("API error: {}", status),
    }
}

async fn check_peer(client: &reqwest::Client, endpoint: &str, public_key: &str) -> anyhow::Result<()> {
    let response = client.get(peer_url(endpoint, public_key)?).send().await?;

    match response.status() {
        reqwest::StatusCode::OK => println!("\x1b[32m✓\x1b[0m Peer exists: {}", public_key),
        reqwest::StatusCode::NOT_FOUND => println!("\x1b[33m✗\x1b[0m Peer not found: {}", public_key),
        _ => return Err(api_error(response).await),
    }
    Ok(())
}

async fn add_peer(
    client: &reqwest::Client,
    endpoint: &str,
    public_key: &str,
    allowed_ips: Option<&str>,
) -> anyhow::Result<()> {
    let url = format!("{}/peer", endpoint.trim_end_matches('/'));
    let mut body = serde_json::json!({ "publicKey": public_key });
    if let Some(ips) = allowed_ips {
        body["allowedIPs"] = serde_json::Value::from(ips);
    }

    let response = client.post(&url).json(&body).send().await?;
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let result: MessageResponse = response.json().await?;
    println!("{}", result.message);
    if let Some(ips) = result.allowed_ips {
        println!("  Public Key:  {}", public_key);
        println!("  Allowed IPs: {}", ips);
    }
    Ok(())
}

async fn remove_peer(client: &reqwest::Client, endpoint: &str, public_key: &str) -> anyhow::Result<()> {
    let response = client.delete(peer_url(endpoint, public_key)?).send().await?;

    match response.status() {
        reqwest::StatusCode::OK | reqwest::StatusCode::NOT_FOUND => {
            let result: MessageResponse = response.json().await?;
            println!("{}", result.message);
            Ok(())
        }
        _ => Err(api_error(response).await),
    }
}

async fn next_ip(client: &reqwest::Client, endpoint: &str, subnet: Option<&str>) -> anyhow::Result<()> {
    let url = format!("{}/available-ip", endpoint.trim_end_matches('/'));
    let mut request = client.get(&url);
    if let Some(subnet) = subnet {
        request = request.query(&[("subnet", subnet)]);
    }

    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let result: AvailableIpResponse = response.json().await?;
    println!("{}", result.available_ip);
    Ok(())
}

async fn list_peers(client: &reqwest::Client, endpoint: &str) -> anyhow::Result<()> {
    let url = format!("{}/peers", endpoint.trim_end_matches('/'));
    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let peers: Vec<PeerEntry> = response.json().await?;

    println!();
    println!("WireGuard Peers (wolfpeerctl v{})", env!("CARGO_PKG_VERSION"));
    println!("==================================");
    println!();
    println!("{:<46} {}", "PUBLIC KEY", "ALLOWED IPS");
    println!("{}", "-".repeat(70));
    for peer in &peers {
        let ips = if peer.allowed_ips.is_empty() {
            "(none)".to_string()
        } else {
            peer.allowed_ips.join(", ")
        };
        println!("{:<46} {}", peer.public_key, ips);
    }
    println!();
    println!("Total: {} peers", peers.len());

    Ok(())
}
