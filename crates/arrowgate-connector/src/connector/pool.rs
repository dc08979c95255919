//! Worker pool orchestration.
//!
//! Owns the configured number of [`ConnectionWorker`]s, each independently
//! running its own lifecycle loop against the same gateway and tenant
//! identity. Workers share nothing mutable with each other - only read
//! access to the dataset provider and the metrics handle.

use crate::connector::config::ConnectorConfig;
use crate::connector::metrics::MetricsHandle;
use crate::connector::worker::ConnectionWorker;
use arrowgate_dataset::DataLoader;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ConnectorPool {
    config: Arc<ConnectorConfig>,
    loader: Arc<DataLoader>,
    metrics: MetricsHandle,
    shutdown: CancellationToken,
}

impl ConnectorPool {
    pub fn new(
        config: Arc<ConnectorConfig>,
        loader: Arc<DataLoader>,
        metrics: MetricsHandle,
    ) -> Self {
        Self { config, loader, metrics, shutdown: CancellationToken::new() }
    }

    /// Token that stops every worker when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawns all workers and waits for every one of them to exit.
    pub async fn run(&self) {
        tracing::info!(
            connections = self.config.parallel_connections,
            tenant = %self.config.tenant_id,
            transport = ?self.config.transport,
            "starting connector pool"
        );

        let handles: Vec<_> = (0..self.config.parallel_connections)
            .map(|worker_id| {
                let worker = ConnectionWorker::new(
                    worker_id,
                    Arc::clone(&self.config),
                    Arc::clone(&self.loader),
                    self.metrics.clone(),
                    self.shutdown.clone(),
                );
                tokio::spawn(worker.run())
            })
            .collect();

        for (worker_id, handle) in handles.into_iter().enumerate() {
            if let Err(err) = handle.await {
                tracing::error!(worker = worker_id, %err, "worker task panicked");
            }
        }

        tracing::info!("connector pool stopped");
    }

    /// Signals every worker to stop; each finishes its current loop
    /// iteration rather than being aborted mid-frame.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::dispatch::tests::test_config;
    use std::time::Duration;

    #[tokio::test]
    async fn pool_runs_and_stops_all_workers() {
        let mut config = ConnectorConfig::clone(&test_config());
        config.gateway_ws_url = "ws://127.0.0.1:9/ws/connect".to_string();
        config.parallel_connections = 3;
        config.reconnect_delay = Duration::from_millis(20);
        let config = Arc::new(config);

        let loader = Arc::new(DataLoader::new(
            std::env::temp_dir().join("arrowgate-pool-tests"),
            16,
        ));
        let pool = Arc::new(ConnectorPool::new(config, loader, MetricsHandle::new()));

        let stop_pool = Arc::clone(&pool);
        let stopper = async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            stop_pool.stop();
        };
        let run = tokio::time::timeout(Duration::from_secs(5), pool.run());
        let (result, ()) = tokio::join!(run, stopper);
        result.expect("pool must stop once signalled");
    }
}
