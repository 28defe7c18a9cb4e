//! RadWatch Server
//!
//! Runs model uploads, training and batch classification in the
//! background while serving status polls over HTTP.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use radwatch_server::{build_router, spawn_retention_sweeper, AppState, ServerConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "radwatch-server")]
#[command(about = "RadWatch moderation ML operations server", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "RADWATCH_CONFIG", default_value = "config.yaml")]
    config: String,

    /// Listen address, overrides the config file
    #[arg(short = 'l', long, env = "RADWATCH_LISTEN")]
    listen: Option<String>,

    /// Listen port, overrides the config file
    #[arg(short = 'P', long, env = "RADWATCH_PORT")]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);
    info!("Starting RadWatch server");

    let mut config = ServerConfig::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    info!(
        models_dir = %config.classifiers.models_dir.display(),
        datasets_dir = %config.training.datasets_dir.display(),
        staging_dir = %config.uploads.staging_dir.display(),
        "Configuration loaded"
    );

    let metrics_handle = init_metrics()?;

    let state = AppState::bootstrap(&config)?.with_metrics(metrics_handle);

    let sweeper_shutdown = CancellationToken::new();
    let sweeper = spawn_retention_sweeper(
        state.clone(),
        Duration::from_secs(config.sweep_interval_secs.max(1)),
        sweeper_shutdown.clone(),
    );

    let addr: SocketAddr = format!("{}:{}", config.listen, config.port).parse()?;
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    sweeper_shutdown.cancel();
    let _ = sweeper.await;
    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("radwatch=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("radwatch=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    radwatch_telemetry::metrics::describe();

    info!("Metrics exporter initialized");
    Ok(handle)
}
