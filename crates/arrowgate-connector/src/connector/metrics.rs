//! Usage metrics, uploaded on a separate observability plane.
//!
//! Handlers record counters through [`MetricsHandle`] as fire-and-forget
//! notifications; nothing here can fail back into request handling. A
//! background task periodically POSTs a JSON snapshot to the metrics plane,
//! keeping the tunnel itself clean for Arrow IPC streaming. Upload failures
//! log once per outage, not once per interval.

use crate::connector::config::{ConnectorConfig, hostname};
use arrowgate_core::wire::CLIENT_VERSION;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// How many recent query durations feed the reported average.
const DURATION_WINDOW: usize = 100;

/// Cheap, cloneable handle to the shared metrics counters.
#[derive(Clone)]
pub struct MetricsHandle {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    started: Instant,
    bytes_sent: AtomicU64,
    records_sent: AtomicU64,
    queries_processed: AtomicU64,
    errors: AtomicU64,
    connected: AtomicBool,
    /// Unix seconds of the last processed query; 0 means never.
    last_query_unix: AtomicU64,
    durations_ms: parking_lot::Mutex<VecDeque<f64>>,
}

impl MetricsHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                started: Instant::now(),
                bytes_sent: AtomicU64::new(0),
                records_sent: AtomicU64::new(0),
                queries_processed: AtomicU64::new(0),
                errors: AtomicU64::new(0),
                connected: AtomicBool::new(false),
                last_query_unix: AtomicU64::new(0),
                durations_ms: parking_lot::Mutex::new(VecDeque::with_capacity(DURATION_WINDOW)),
            }),
        }
    }

    pub fn record_bytes_sent(&self, count: u64) {
        self.inner.bytes_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_records_sent(&self, count: u64) {
        self.inner.records_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_query_processed(&self, duration_ms: Option<f64>) {
        self.inner.queries_processed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .last_query_unix
            .store(unix_now_secs(), Ordering::Relaxed);
        if let Some(duration_ms) = duration_ms {
            let mut durations = self.inner.durations_ms.lock();
            if durations.len() == DURATION_WINDOW {
                durations.pop_front();
            }
            durations.push_back(duration_ms);
        }
    }

    pub fn record_error(&self) {
        self.inner.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::Relaxed);
    }

    /// Snapshot of the counters as the upload payload.
    fn payload(&self) -> serde_json::Value {
        let last_query = self.inner.last_query_unix.load(Ordering::Relaxed);
        let avg_duration = {
            let durations = self.inner.durations_ms.lock();
            (!durations.is_empty())
                .then(|| durations.iter().sum::<f64>() / durations.len() as f64)
        };

        serde_json::json!({
            "agent_type": "connector",
            "version": CLIENT_VERSION,
            "uptime_seconds": self.inner.started.elapsed().as_secs(),
            "connected": self.inner.connected.load(Ordering::Relaxed),
            "errors_total": self.inner.errors.load(Ordering::Relaxed),
            "bytes_sent_total": self.inner.bytes_sent.load(Ordering::Relaxed),
            "records_sent_total": self.inner.records_sent.load(Ordering::Relaxed),
            "queries_processed": self.inner.queries_processed.load(Ordering::Relaxed),
            "hostname": hostname(),
            "os_info": format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            "last_query_timestamp": (last_query > 0).then_some(last_query),
            "avg_query_duration_ms": avg_duration,
        })
    }
}

impl Default for MetricsHandle {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Periodic upload loop. Runs until the shutdown token fires; never
/// propagates failures anywhere.
pub async fn run_reporter(
    metrics: MetricsHandle,
    config: Arc<ConnectorConfig>,
    shutdown: CancellationToken,
) {
    let Some(base_url) = config.metrics_url.as_deref() else {
        return;
    };
    let url = format!(
        "{}/api/metrics/agent/{}",
        base_url.trim_end_matches('/'),
        config.tenant_id
    );

    let client = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(%err, "failed to build metrics client; metrics disabled");
            return;
        }
    };

    tracing::info!(%url, interval_secs = config.metrics_interval.as_secs(), "metrics reporter started");

    let mut healthy = true;
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = sleep(config.metrics_interval) => {}
        }

        match client.post(&url).json(&metrics.payload()).send().await {
            Ok(resp) if resp.status().is_success() => {
                if !healthy {
                    tracing::info!("metrics reporting resumed");
                }
                healthy = true;
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "metrics upload rejected");
                healthy = false;
            }
            Err(err) => {
                if healthy {
                    tracing::warn!(%err, "metrics upload failed");
                }
                healthy = false;
            }
        }
    }

    tracing::info!("metrics reporter stopped");
}
