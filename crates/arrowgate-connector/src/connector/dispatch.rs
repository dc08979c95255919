//! Command dispatch for an active connection.
//!
//! Every inbound command is handled on its own spawned task; the connection
//! worker's read loop never awaits a handler, so a long-running stream can
//! never stall command intake. Failures inside a handler stay local to that
//! request - they are reported in-band (error metadata response or
//! stream-end error frame) and must never unwind into the read loop or
//! another in-flight request.

use crate::connector::config::ConnectorConfig;
use crate::connector::handlers;
use crate::connector::metrics::MetricsHandle;
use crate::connector::transport::Tunnel;
use arrowgate_core::wire::{Command, ControlFrame};
use arrowgate_dataset::DataLoader;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared state for all requests on one connection.
pub struct ConnectionContext {
    pub worker_id: usize,
    pub config: Arc<ConnectorConfig>,
    pub loader: Arc<DataLoader>,
    pub metrics: MetricsHandle,
    pub tunnel: Arc<dyn Tunnel>,
    /// Held for the duration of one streaming response on linear transports,
    /// whose binary payload frames carry no request identity and therefore
    /// must not interleave. `None` on multiplexed transports.
    pub stream_lock: Option<Arc<tokio::sync::Mutex<()>>>,
    /// Cancelled on connection teardown so orphaned request tasks stop
    /// instead of streaming into a dead transport.
    pub cancel: CancellationToken,
}

impl ConnectionContext {
    pub fn new(
        worker_id: usize,
        config: Arc<ConnectorConfig>,
        loader: Arc<DataLoader>,
        metrics: MetricsHandle,
        tunnel: Arc<dyn Tunnel>,
        cancel: CancellationToken,
    ) -> Self {
        let stream_lock =
            (!tunnel.multiplexed()).then(|| Arc::new(tokio::sync::Mutex::new(())));
        Self { worker_id, config, loader, metrics, tunnel, stream_lock, cancel }
    }
}

/// Routes one inbound command to its handler task.
pub fn dispatch(ctx: &Arc<ConnectionContext>, command: Command) {
    match command {
        Command::GetFlightInfo { request_id, path, rows } => {
            let ctx = Arc::clone(ctx);
            tokio::spawn(async move {
                handlers::metadata::handle(ctx, request_id, path, rows).await;
            });
        }
        Command::DoGet { request_id, ticket } => {
            let ctx = Arc::clone(ctx);
            tokio::spawn(async move {
                handlers::streaming::handle(ctx, request_id, ticket).await;
            });
        }
        Command::Heartbeat { request_id, timestamp } => {
            let ctx = Arc::clone(ctx);
            tokio::spawn(async move {
                let reply = ControlFrame::HeartbeatReply {
                    request_id,
                    tenant_id: ctx.config.tenant_id.clone(),
                    timestamp,
                };
                if let Err(err) = ctx.tunnel.send_control(reply).await {
                    tracing::debug!(worker = ctx.worker_id, %err, "heartbeat reply failed");
                }
            });
        }
        Command::RegisterAck { status, .. } => {
            tracing::warn!(%status, "unexpected register response on active connection");
        }
        Command::Unknown { action } => {
            // Forward compatibility: future gateway capabilities are ignored,
            // not rejected.
            tracing::debug!(%action, "ignoring unrecognized command");
        }
    }
}
