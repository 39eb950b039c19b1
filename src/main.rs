//! Quorum Peers Exporter
//!
//! Prometheus exporter that reconciles the peers a Quorum node is expected
//! to be connected to against the peers it actually reports.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   QUORUM PEERS EXPORTER                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Peer Book (config)      ←── Expected peers, display names   │
//! │  RPC Source              ←── admin_peers every interval      │
//! │  Probe Source            ←── TCP connect to each peer        │
//! │  Reconciler              ←── Expected vs observed → samples  │
//! │  Snapshot Stores         ←── Atomically swapped per pass     │
//! │  HTTP API (8000)         ←── /metrics scrape endpoint        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

mod api;
mod config;
mod identity;
mod naming;
mod provider;
mod reconciler;
mod snapshot;
mod source;
mod store;
mod types;

use api::{ApiState, ExporterStats, ScrapeCollector};
use config::ExporterConfig;
use provider::{Exporter, MetricsProvider, Poll};
use source::{ProbeSource, RpcSource};

/// Quorum Peers Exporter - expected vs connected peers as Prometheus metrics
#[derive(Parser, Debug)]
#[command(name = "quorum-peers-exporter")]
#[command(version)]
#[command(about = "Prometheus exporter for Quorum node peer connectivity", long_about = None)]
struct Args {
    /// Path to configuration file (.json or .toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// HTTP port of the scrape endpoint
    #[arg(long)]
    port: Option<u16>,

    /// Seconds between reconciliation passes
    #[arg(long)]
    interval: Option<u64>,

    /// Disable the TCP egress connectivity probe
    #[arg(long)]
    no_probe: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
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

    info!("Quorum Peers Exporter v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match ExporterConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Cannot load config {:?}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Override config with CLI args
    let config = config
        .with_listen_port(args.port)
        .with_poll_interval(args.interval)
        .with_probe_disabled(args.no_probe);

    if let Err(e) = config.validate() {
        error!("Invalid config {:?}: {}", args.config, e);
        std::process::exit(1);
    }

    let book = Arc::new(config.peer_book()?);
    let instance_name = config.instance_name();

    info!("⚙️  Configuration:");
    info!("   RPC URL: {}", config.rpc_url);
    info!("   Instance name: {}", instance_name);
    info!("   Configured peers: {}", book.len());
    info!("   Poll interval: {}s", config.poll_interval_secs);
    info!("   Probe enabled: {}", config.probe_enabled);
    info!("   Listen port: {}", config.listen_port);

    let stats = Arc::new(ExporterStats::new());

    // One exporter per source, each with its own snapshot store
    let rpc = Arc::new(Exporter::new(
        book.clone(),
        RpcSource::new(
            &config.rpc_url,
            Duration::from_secs(config.rpc_timeout_secs),
            config.instance_port,
        )?,
        instance_name.clone(),
        stats.clone(),
    ));

    let mut pollers: Vec<Arc<dyn Poll>> = vec![rpc.clone() as Arc<dyn Poll>];
    let mut providers: Vec<Arc<dyn MetricsProvider>> = vec![rpc as Arc<dyn MetricsProvider>];

    if config.probe_enabled {
        let probe = Arc::new(Exporter::new(
            book.clone(),
            ProbeSource::new(Duration::from_secs(config.probe_timeout_secs)),
            instance_name,
            stats.clone(),
        ));
        pollers.push(probe.clone());
        providers.push(probe);
    }

    let state = Arc::new(ApiState {
        collector: Arc::new(ScrapeCollector::new(providers, stats)),
        book,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let polling_handle = tokio::spawn(provider::run_polling(
        pollers,
        Duration::from_secs(config.poll_interval_secs),
        shutdown_rx.clone(),
    ));

    let mut api_handle = tokio::spawn(api::run_api_server(
        config.listen_port,
        state,
        shutdown_rx,
    ));

    info!("✅ All services started");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Interrupt received");
        }
        _ = terminate() => {
            info!("🛑 SIGTERM received");
        }
        result = &mut api_handle => {
            error!("HTTP API exited: {:?}", result);
            let _ = shutdown_tx.send(true);
            let _ = polling_handle.await;
            anyhow::bail!("HTTP API stopped unexpectedly");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = polling_handle.await;
    if let Ok(Err(e)) = api_handle.await {
        error!("HTTP API shutdown error: {}", e);
    }

    info!("👋 Quorum Peers Exporter shutting down");
    Ok(())
}

/// Resolves on SIGTERM; never on other platforms
#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Cannot install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
