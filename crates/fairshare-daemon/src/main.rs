//! fairshare daemon
//!
//! Builds the queue tree, keeps the usage cache warm and serves the REST API.

use anyhow::Context;
use clap::Parser;
use fairshare_api::{create_router, AppState};
use fairshare_core::DaemonConfig;
use fairshare_scheduler::QueueHierarchy;
use fairshare_usage::{get_client, UsageLister};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// fairshare daemon - time-aware fair-share accounting for a GPU scheduler
#[derive(Parser, Debug)]
#[command(name = "fairshared")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Address to bind the API server (overrides the config file)
    #[arg(long)]
    address: Option<String>,

    /// Port for the REST API server (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Result of waiting for the first usage snapshot at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheSync {
    Synced,
    TimedOut,
    Cancelled,
}

/// Wait for the lister's first snapshot, bounded by its wait timeout.
///
/// If `cancel` completes first, shutdown is broadcast to the lister.
async fn wait_for_usage<F>(
    lister: &UsageLister,
    shutdown_tx: &watch::Sender<bool>,
    shutdown_rx: &mut watch::Receiver<bool>,
    cancel: F,
) -> CacheSync
where
    F: Future<Output = ()>,
{
    let sync = tokio::time::timeout(lister.wait_timeout(), lister.wait_for_cache_sync(shutdown_rx));
    tokio::select! {
        synced = sync => match synced {
            Ok(true) => CacheSync::Synced,
            Ok(false) => CacheSync::Cancelled,
            Err(_) => CacheSync::TimedOut,
        },
        _ = cancel => {
            let _ = shutdown_tx.send(true);
            CacheSync::Cancelled
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

async fn stop_lister(shutdown_tx: &watch::Sender<bool>, handle: Option<JoinHandle<()>>) {
    let _ = shutdown_tx.send(true);
    if let Some(handle) = handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "Usage lister task failed");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DaemonConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => DaemonConfig::default(),
    };

    // Initialize logging
    let log_level = parse_level(args.log_level.as_deref().unwrap_or(&config.logging.level));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    info!("Starting fairshare daemon v{}", env!("CARGO_PKG_VERSION"));

    let queues = Arc::new(QueueHierarchy::build(&config.queues).context("Invalid queue hierarchy")?);
    info!(queues = queues.len(), "Queue hierarchy loaded");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    // Usage lister
    let usage_db = config.usage_db.as_ref();
    let mut lister_handle = None;
    let lister = match get_client(usage_db).context("Invalid usage database configuration")? {
        Some(source) => {
            let params = usage_db
                .map(|db| db.usage_params.clone())
                .unwrap_or_default();
            let lister = Arc::new(UsageLister::new(source, &params));
            lister_handle = Some(lister.start(shutdown_rx.clone())?);

            match wait_for_usage(&lister, &shutdown_tx, &mut shutdown_rx, shutdown_signal()).await {
                CacheSync::Synced => info!("Usage cache synced"),
                CacheSync::TimedOut => warn!(
                    wait_timeout = ?lister.wait_timeout(),
                    "Timed out waiting for usage cache sync, continuing without usage data"
                ),
                CacheSync::Cancelled => {
                    warn!("Shutdown before usage cache synced");
                    stop_lister(&shutdown_tx, lister_handle).await;
                    info!("fairshare daemon stopped");
                    return Ok(());
                }
            }
            Some(lister)
        }
        None => {
            info!("No usage database configured, time-aware fairness disabled");
            None
        }
    };

    let router = create_router(AppState {
        lister,
        queues,
    });

    // Bind and serve
    let address = args.address.unwrap_or(config.api.rest_address);
    let port = args.port.unwrap_or(config.api.rest_port);
    let addr: SocketAddr = format!("{}:{}", address, port)
        .parse()
        .with_context(|| format!("Invalid address {}:{}", address, port))?;

    info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    stop_lister(&shutdown_tx, lister_handle).await;

    info!("fairshare daemon stopped");
    Ok(())
}
