// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # MultiVault Devnet Node
//!
//! Entry point for the `multivault-node` binary. Parses CLI arguments,
//! loads the JSON config, assembles the simulated vault, and runs three
//! things side by side: the REST API, the metrics endpoint, and a keeper
//! loop that harvests the vault through the batch harvester while a block
//! ticker advances the simulated chain.
//!
//! - `run`:     start the node
//! - `init`:    create the data directory and a default config
//! - `status`:  query a running node's status endpoint
//! - `version`: print build version information

mod api;
mod cli;
mod config;
mod devnet;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;

use multivault_protocol::storage::VaultStore;

use cli::{Commands, MultiVaultCli};
use config::NodeConfig;
use devnet::Devnet;
use logging::LogFormat;
use metrics::{NodeMetrics, SharedMetrics};

/// Sub-directory of the data directory holding the sled store.
const STORE_DIR: &str = "store";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = MultiVaultCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: API server, metrics endpoint, keeper loop and block ticker.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let mut config = NodeConfig::resolve(args.config.as_deref(), &args.data_dir)?;
    config.apply_overrides(&args);
    config.validate()?;

    logging::init_logging(&config.log_level, LogFormat::from_str_lossy(&config.log_format))?;

    tracing::info!(
        network = %config.network,
        rpc_port = config.rpc_port,
        metrics_port = config.metrics_port,
        keeper_interval_secs = config.keeper_interval_secs,
        data_dir = %args.data_dir.display(),
        "starting multivault-node"
    );

    // --- Persistent storage ---
    let store_path = args.data_dir.join(STORE_DIR);
    std::fs::create_dir_all(&store_path)
        .with_context(|| format!("failed to create store directory: {}", store_path.display()))?;
    let store = Arc::new(
        VaultStore::open(&store_path)
            .with_context(|| format!("failed to open vault store at {}", store_path.display()))?,
    );
    tracing::info!(path = %store_path.display(), "vault store opened");

    // --- Vault ---
    let devnet = Arc::new(Devnet::build(&config, store)?);

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    node_metrics
        .block_height
        .set(i64::try_from(devnet.block_number()).unwrap_or(i64::MAX));

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            multivault_protocol::config::PROTOCOL_VERSION,
        ),
        network: config.network.clone(),
        devnet: Arc::clone(&devnet),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", config.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Background loops ---
    let ticker = spawn_block_ticker(
        Arc::clone(&devnet),
        Arc::clone(&node_metrics),
        Duration::from_millis(config.block_time_ms),
    );
    let keeper = spawn_keeper(
        Arc::clone(&devnet),
        Arc::clone(&node_metrics),
        Duration::from_secs(config.keeper_interval_secs),
    );

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    ticker.abort();
    keeper.abort();
    if let Err(e) = devnet.snapshot() {
        tracing::warn!(error = %e, "failed to persist final vault snapshot");
    }
    tracing::info!("multivault-node stopped");
    Ok(())
}

/// Advances the simulated chain one block per `period`.
fn spawn_block_ticker(devnet: Arc<Devnet>, metrics: SharedMetrics, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            match devnet.tick() {
                Ok(block) => {
                    metrics
                        .block_height
                        .set(i64::try_from(block).unwrap_or(i64::MAX));
                    tracing::trace!(block, "block produced");
                }
                Err(e) => tracing::warn!(error = %e, "block tick failed"),
            }
        }
    })
}

/// Runs one harvest batch per `period` from the dedicated server.
fn spawn_keeper(devnet: Arc<Devnet>, metrics: SharedMetrics, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            match devnet.keeper_round() {
                Ok(report) => {
                    metrics.hard_works_total.inc_by(report.harvested.len() as u64);
                    metrics.record_compensation(report.compensated_total);
                    if let Ok((tvl, _)) = devnet.vault.tvl() {
                        metrics.set_tvl(tvl);
                    }
                    if let Err(e) = devnet.snapshot() {
                        tracing::warn!(error = %e, "failed to persist vault snapshot");
                    }
                }
                Err(e) => {
                    metrics.hard_work_failures_total.inc();
                    tracing::warn!(error = %e, "keeper round failed");
                }
            }
        }
    })
}

/// Creates the data directory and writes a default `config.json`.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("multivault_node=info", LogFormat::Pretty)?;

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), network = %args.network, "initializing node");

    std::fs::create_dir_all(data_dir.join(STORE_DIR))
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let config_path = NodeConfig::default_path(data_dir);
    if config_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            config_path.display()
        );
    }

    let config = NodeConfig {
        network: args.network.clone(),
        ..NodeConfig::default()
    };
    config.save(&config_path)?;

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Network        : {}", args.network);
    println!("  Config         : {}", config_path.display());
    println!("  Vault          : {}", config.vault.address);
    println!("  API port       : {}", config.rpc_port);

    Ok(())
}

/// Queries a running node's status endpoint and prints the body.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.rpc_url.trim_end_matches('/'));
    let body = http_get(&url).await?;
    println!("{}", body);
    Ok(())
}

/// Plain HTTP/1.1 GET over a tokio TCP stream. Only `http://` URLs.
async fn http_get(url: &str) -> Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| anyhow::anyhow!("only http:// URLs are supported: {}", url))?;
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let addr = if authority.contains(':') {
        authority.to_string()
    } else {
        format!("{}:80", authority)
    };
    let host = authority.split(':').next().unwrap_or(authority);

    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, host,
    );
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    let (head, body) = response
        .split_once("\r\n\r\n")
        .ok_or_else(|| anyhow::anyhow!("malformed HTTP response from {}", addr))?;
    if !head.starts_with("HTTP/1.1 200") {
        let status_line = head.lines().next().unwrap_or_default();
        anyhow::bail!("node answered {}", status_line);
    }
    Ok(body.to_string())
}

fn print_version() {
    println!("multivault-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol        {}", multivault_protocol::config::PROTOCOL_VERSION);
    println!("rustc           {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
