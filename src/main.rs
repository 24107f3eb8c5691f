//! KratOs Peer RPC Service
//!
//! Peer directory and handshake-gated RPC transport for KratOs nodes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    KRATOS PEER RPC                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Peer Transport (5000)    ←── handshake, then ping/height/  │
//! │                               status/list calls             │
//! │  Handshake Validator      ←── nethash, version, nonce       │
//! │  RPC Dispatcher           ←── chain tip + peer directory    │
//! │  Peer Directory (RocksDB) ←── known peers by (ip, wsPort)   │
//! │  Discovery Sink           ←── records accepted peers        │
//! │  HTTP API (4000)          ←── status and metrics            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

mod api;
mod chain;
mod config;
mod directory;
mod discovery;
mod handshake;
mod rpc;
mod session;
mod transport;
mod types;

#[cfg(test)]
mod tests;

use api::{ApiState, Metrics};
use chain::LocalChain;
use config::NodeConfig;
use directory::{PeerDirectory, PeerSchema, PeerStore};
use handshake::{HandshakeIdentity, HandshakeValidator, LocalIdentity};
use rpc::RpcDispatcher;
use transport::{PeerClient, TransportContext};
use types::{Broadhash, PeerRecord};

/// KratOs Peer RPC - peer directory and RPC transport
#[derive(Parser, Debug)]
#[command(name = "kratos-peer-rpc")]
#[command(author = "KratOs Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Peer directory and handshake-gated RPC transport for KratOs nodes", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "peer-rpc.toml")]
    config: PathBuf,

    /// Data directory for the peer directory
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Peer transport port
    #[arg(long)]
    ws_port: Option<u16>,

    /// HTTP API port
    #[arg(long)]
    api_port: Option<u16>,

    /// Network hash peers must advertise
    #[arg(long)]
    nethash: Option<String>,

    /// Oldest peer version accepted
    #[arg(long)]
    min_version: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Insert the peers listed in this JSON file and exit
    #[arg(long)]
    import_peers: Option<PathBuf>,

    /// Remove every peer from the directory and exit
    #[arg(long)]
    clear_peers: bool,

    /// Connect to a remote node, print its status and exit
    #[arg(long)]
    probe: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into())
        )
        .init();

    info!("🌐 KratOs Peer RPC v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if args.config.exists() {
        NodeConfig::load(&args.config)?
    } else {
        warn!("Config file not found, using defaults");
        NodeConfig::default()
    };

    // Override config with CLI args
    let config = config
        .with_ws_port(args.ws_port)
        .with_api_port(args.api_port)
        .with_nethash(args.nethash.clone())
        .with_min_version(args.min_version.clone());

    config.validate()?;

    let nonce = handshake::generate_nonce();

    if let Some(addr) = args.probe {
        return probe_remote(&config, &nonce, addr).await;
    }

    // Open peer directory
    tokio::fs::create_dir_all(&args.data_dir).await?;
    let directory_path = args.data_dir.join("peers");
    let schema = Arc::new(PeerSchema::default());
    let directory = Arc::new(PeerDirectory::open(&directory_path, schema)?);
    info!("📦 Peer directory opened at {:?}", directory_path);

    if args.clear_peers {
        directory.clear()?;
        directory.flush()?;
        info!("🧹 Peer directory cleared");
        return Ok(());
    }

    if let Some(path) = &args.import_peers {
        return import_peers(&directory, path);
    }

    info!("⚙️  Configuration:");
    info!("   Nethash: {}", config.nethash);
    info!("   Minimum peer version: {}", config.min_version);
    info!("   Transport port: {}", config.ws_port);
    info!("   API port: {}", config.api_port);

    debug!("Process nonce: {}", nonce);

    let shared_config = Arc::new(config);

    let validator = Arc::new(HandshakeValidator::new(LocalIdentity {
        nethash: shared_config.nethash.clone(),
        min_version: shared_config.min_node_version()?,
        nonce,
        port: shared_config.ws_port,
    }));

    let genesis = Broadhash::from_hex(&shared_config.nethash).map_err(anyhow::Error::msg)?;
    let chain = Arc::new(LocalChain::genesis(genesis, shared_config.initial_height));

    let store: Arc<dyn PeerStore> = directory.clone();
    let dispatcher = Arc::new(RpcDispatcher::new(store.clone(), chain.clone()));
    let metrics = Arc::new(Metrics::new());
    let (discovery_tx, discovery_rx) = discovery::channel();

    let transport_ctx = Arc::new(TransportContext {
        config: shared_config.clone(),
        validator,
        dispatcher,
        metrics: metrics.clone(),
        discovery: discovery_tx,
    });

    let api_state = Arc::new(ApiState {
        config: shared_config.clone(),
        store: store.clone(),
        chain,
        metrics: metrics.clone(),
    });

    // Start all services concurrently
    let listener = transport::bind(&shared_config).await?;
    let transport_handle = tokio::spawn(transport::run_server(listener, transport_ctx));

    let discovery_handle = tokio::spawn(discovery::run_discovery(
        discovery_rx,
        store,
        metrics,
        shared_config.discovery_flush_secs,
    ));

    let api_handle = tokio::spawn(api::run_api_server(api_state));

    info!("✅ All services started");
    info!("   Press Ctrl+C to shutdown gracefully");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
        }
        result = transport_handle => {
            error!("Peer transport exited: {:?}", result);
        }
        result = discovery_handle => {
            error!("Discovery task exited: {:?}", result);
        }
        result = api_handle => {
            error!("HTTP API exited: {:?}", result);
        }
    }

    // Graceful shutdown: flush directory
    directory.flush()?;
    info!("📦 Peer directory flushed to disk");

    info!("👋 KratOs Peer RPC shutting down");
    Ok(())
}

/// Load a JSON array of peer records and insert it as one batch
fn import_peers(directory: &PeerDirectory, path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)?;
    let peers: Vec<PeerRecord> = serde_json::from_str(&content)?;

    let written = directory.insert_batch(&peers)?;
    directory.flush()?;

    info!("📥 Imported {} peers from {:?}", written, path);
    Ok(())
}

/// Open a session on a remote node and report what it answers
async fn probe_remote(config: &NodeConfig, nonce: &str, addr: SocketAddr) -> anyhow::Result<()> {
    let identity = HandshakeIdentity {
        nethash: config.nethash.clone(),
        version: config.node_version.parse().map_err(anyhow::Error::msg)?,
        nonce: nonce.to_string(),
        port: config.ws_port,
        self_probe: false,
    };

    let mut client = PeerClient::connect(addr, Some(identity.to_query())).await?;
    info!("🤝 Handshake accepted by {}", client.remote());

    for procedure in ["ping", "status", "list"] {
        let response = client.call(procedure).await?;
        info!("   {} → {}", procedure, serde_json::to_string(&response)?);
    }

    client.disconnect().await?;
    Ok(())
}
