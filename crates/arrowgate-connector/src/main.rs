#![doc = include_str!("../README.md")]

mod connector;

use arrowgate_dataset::DataLoader;
use clap::Parser;
use connector::config::{CliArgs, ConnectorConfig};
use connector::metrics::{MetricsHandle, run_reporter};
use connector::pool::ConnectorPool;
use connector::telemetry::init_telemetry;
use std::sync::Arc;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = Arc::new(ConnectorConfig::try_from(args)?);

    init_telemetry();
    log_startup_info(&config);

    let loader = Arc::new(DataLoader::new(
        config.datasets_dir.clone(),
        config.default_synthetic_rows,
    ));

    // Generate the shared default dataset up front so the first request
    // doesn't pay the generation latency.
    {
        let loader = Arc::clone(&loader);
        tokio::task::spawn_blocking(move || loader.load_or_generate(None)).await?;
    }

    let metrics = MetricsHandle::new();
    let pool = Arc::new(ConnectorPool::new(Arc::clone(&config), loader, metrics.clone()));

    if config.metrics_url.is_some() {
        tokio::spawn(run_reporter(
            metrics.clone(),
            Arc::clone(&config),
            pool.shutdown_token(),
        ));
    }

    let signal_pool = Arc::clone(&pool);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, terminating gracefully...");
        signal_pool.stop();
    });

    pool.run().await;

    tracing::info!("Connector shut down successfully");
    Ok(())
}

fn log_startup_info(config: &ConnectorConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting connector with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting connector for tenant {} with {} parallel connection(s)",
            config.tenant_id,
            config.parallel_connections
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
