//! WolfPeer - WireGuard Peer Control Plane
//!
//! Serves the HTTP API that checks, adds and removes peers on a WireGuard
//! interface and hands out free addresses.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfpeer::config::WolfPeerConfig;
use wolfpeer::wireguard::{CommandInterface, MemoryInterface, WireGuardInterface};
use wolfpeer::directory::PeerDirectory;
use wolfpeer::api::HttpServer;
use wolfpeer::error::Result;

/// WolfPeer - WireGuard Peer Control Plane
#[derive(Parser)]
#[command(name = "wolfpeer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfpeer.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Start {
        /// Listen port (overrides api.bind_address port)
        #[arg(short, long)]
        port: Option<u16>,

        /// WireGuard interface to manage
        #[arg(short, long)]
        interface: Option<String>,

        /// Default allocation subnet (a.b.c.d/n)
        #[arg(short, long)]
        subnet: Option<String>,

        /// Use an in-memory peer table instead of running `wg`
        #[arg(long)]
        dry_run: bool,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfpeer.toml")]
        output: PathBuf,

        /// WireGuard interface to manage
        #[arg(long, default_value = "wg0")]
        interface: String,
    },

    /// Validate configuration file
    Validate,

    /// Show node information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { output, interface } = &cli.command {
        init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
        return run_init(output.clone(), interface.clone());
    }

    // Load configuration before logging so the file can set the level
    let loaded = load_config(&cli.config);
    let (level, format) = match &loaded {
        Ok(config) => (config.logging.level.clone(), config.logging.format.clone()),
        Err(_) => ("info".to_string(), "pretty".to_string()),
    };
    init_logging(cli.log_level.as_deref().unwrap_or(&level), &format);

    let config = match loaded {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", cli.config, e);
            tracing::error!("Please check that the config file is valid TOML");
            return Err(e);
        }
    };

    match cli.command {
        Commands::Start { port, interface, subnet, dry_run } => {
            run_start(config, port, interface, subnet, dry_run).await
        }
        Commands::Validate => run_validate(&config),
        Commands::Info => run_info(&config),
        Commands::Init { .. } => Ok(()),
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Read the config file, falling back to defaults when it does not exist
fn load_config(path: &Path) -> Result<WolfPeerConfig> {
    if path.exists() {
        WolfPeerConfig::from_file(path)
    } else {
        Ok(WolfPeerConfig::default())
    }
}

/// Start the HTTP API
async fn run_start(
    mut config: WolfPeerConfig,
    port: Option<u16>,
    interface: Option<String>,
    subnet: Option<String>,
    dry_run: bool,
) -> Result<()> {
    tracing::info!("Starting WolfPeer...");

    if let Some(port) = port {
        config.set_port(port)?;
    }
    if let Some(interface) = interface {
        config.interface.name = interface;
    }
    if let Some(subnet) = subnet {
        config.allocation.default_subnet = subnet;
    }
    config.validate()?;

    let iface: Arc<dyn WireGuardInterface> = if dry_run {
        tracing::warn!("Dry run: peers are kept in memory, {} is not touched", config.interface.name);
        Arc::new(MemoryInterface::new(config.interface.name.clone()))
    } else {
        if !nix::unistd::Uid::effective().is_root() {
            tracing::warn!("Not running as root, changes to {} will likely be refused", config.interface.name);
        }
        Arc::new(CommandInterface::from_config(&config.interface))
    };

    // Report the interface state up front; a failure here is not fatal
    match iface.list_peers().await {
        Ok(peers) => tracing::info!("Interface {} has {} peers", iface.interface_name(), peers.len()),
        Err(e) => tracing::warn!("Cannot read interface {}: {}", iface.interface_name(), e),
    }

    let directory = Arc::new(PeerDirectory::new(iface, config.default_subnet()?));
    tracing::info!("Allocating addresses from {}", directory.default_subnet());

    let server = HttpServer::new(config.api.clone(), directory);
    server.start().await
}

/// Initialize configuration file
fn run_init(output: PathBuf, interface: String) -> Result<()> {
    let mut config = WolfPeerConfig::default();
    config.interface.name = interface;

    let config_content = format!(
        "# WolfPeer Configuration\n# Generated configuration file\n\n{}",
        config.to_toml()?
    );

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to set the interface, listen address and subnet.");
    println!("Then start with: wolfpeer --config {} start", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config: &WolfPeerConfig) -> Result<()> {
    match config.validate() {
        Ok(()) => {
            println!("✓ Configuration is valid");
            println!("  Interface: {}", config.interface.name);
            println!("  API Address: {}", config.api.bind_address);
            println!("  Default Subnet: {}", config.allocation.default_subnet);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show node information
fn run_info(config: &WolfPeerConfig) -> Result<()> {
    println!("WolfPeer Node Information");
    println!("=========================");
    println!();
    println!("Interface Configuration:");
    println!("  Name:           {}", config.interface.name);
    println!("  wg Path:        {}", config.interface.wg_path);
    println!("  Timeout:        {} s", config.interface.command_timeout_secs);
    println!();
    println!("API Configuration:");
    println!("  Enabled:        {}", config.api.enabled);
    println!("  Bind Address:   {}", config.api.bind_address);
    println!("  CORS:           {}", config.api.cors_enabled);
    println!("  Strict Remove:  {}", config.api.strict_remove);
    println!();
    println!("Allocation:");
    println!("  Default Subnet: {}", config.allocation.default_subnet);
    println!("  Host Range:     .{} - .{}", wolfpeer::allocator::FIRST_HOST, wolfpeer::allocator::LAST_HOST);

    Ok(())
}
