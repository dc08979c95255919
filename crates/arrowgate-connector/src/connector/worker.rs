//! Connection worker: one tunnel, one lifecycle loop.
//!
//! Each worker owns exactly one tunnel at a time and drives it through
//! `Disconnected -> Connecting -> Registering -> Active` and back. Any
//! transport loss or registration rejection drops the connection, waits the
//! configured reconnect delay, and dials again - forever, as long as the
//! pool's shutdown token is untripped. Availability wins over fast-fail
//! here: the gateway is long-lived infrastructure, so a connector that gives
//! up is strictly worse than one that keeps knocking.
//!
//! Transient losses log at `warn!`; only unexpected faults escalate to
//! `error!`. Neither ever terminates the process.

use crate::connector::config::{ConnectorConfig, TransportKind};
use crate::connector::dispatch::{ConnectionContext, dispatch};
use crate::connector::metrics::MetricsHandle;
use crate::connector::transport::{CommandStream, Tunnel, grpc, websocket};
use arrowgate_core::wire::{CLIENT_VERSION, Command, ControlFrame};
use arrowgate_core::{Error, Result};
use arrowgate_dataset::DataLoader;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

pub struct ConnectionWorker {
    worker_id: usize,
    config: Arc<ConnectorConfig>,
    loader: Arc<DataLoader>,
    metrics: MetricsHandle,
    shutdown: CancellationToken,
}

impl ConnectionWorker {
    pub fn new(
        worker_id: usize,
        config: Arc<ConnectorConfig>,
        loader: Arc<DataLoader>,
        metrics: MetricsHandle,
        shutdown: CancellationToken,
    ) -> Self {
        Self { worker_id, config, loader, metrics, shutdown }
    }

    /// Runs the reconnect loop until shutdown.
    pub async fn run(self) {
        tracing::info!(
            worker = self.worker_id,
            tenant = %self.config.tenant_id,
            "worker started"
        );

        while !self.shutdown.is_cancelled() {
            match self.run_connection().await {
                Ok(()) => break,
                Err(
                    err @ (Error::Transport { .. }
                    | Error::ConnectionClosed
                    | Error::HandshakeTimeout
                    | Error::RegistrationRejected { .. }),
                ) => {
                    tracing::warn!(
                        worker = self.worker_id,
                        %err,
                        delay_secs = self.config.reconnect_delay.as_secs(),
                        "connection lost, retrying"
                    );
                }
                Err(err) => {
                    tracing::error!(worker = self.worker_id, %err, "unexpected connection error");
                }
            }

            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = sleep(self.config.reconnect_delay) => {}
            }
        }

        tracing::info!(worker = self.worker_id, "worker stopped");
    }

    /// One iteration of the loop: dial, register, serve until the tunnel
    /// drops. Returns `Ok(())` only on a shutdown-initiated exit.
    async fn run_connection(&self) -> Result<()> {
        tracing::info!(
            worker = self.worker_id,
            gateway = %self.gateway_target(),
            "connecting"
        );

        let (tunnel, mut commands) = self.dial().await?;
        self.metrics.set_connected(true);
        let result = self.drive(tunnel, &mut commands).await;
        self.metrics.set_connected(false);
        result
    }

    fn gateway_target(&self) -> &str {
        match self.config.transport {
            TransportKind::Websocket => &self.config.gateway_ws_url,
            TransportKind::Grpc => &self.config.gateway_grpc_uri,
        }
    }

    async fn dial(&self) -> Result<(Arc<dyn Tunnel>, CommandStream)> {
        match self.config.transport {
            TransportKind::Websocket => {
                websocket::connect(&self.config.gateway_ws_url, self.config.connect_timeout).await
            }
            TransportKind::Grpc => {
                grpc::connect(&self.config.gateway_grpc_uri, self.config.connect_timeout).await
            }
        }
    }

    /// Registers on a fresh tunnel, then serves commands until it drops.
    async fn drive(&self, tunnel: Arc<dyn Tunnel>, commands: &mut CommandStream) -> Result<()> {
        self.register(&tunnel, commands).await?;

        // One cancellation scope per connection: tearing the connection down
        // stops any request task still streaming into the dead tunnel.
        let ctx = Arc::new(ConnectionContext::new(
            self.worker_id,
            Arc::clone(&self.config),
            Arc::clone(&self.loader),
            self.metrics.clone(),
            tunnel,
            self.shutdown.child_token(),
        ));

        let result = loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break Ok(()),
                command = commands.recv() => match command {
                    Some(command) => dispatch(&ctx, command),
                    None => break Err(Error::ConnectionClosed),
                },
            }
        };

        ctx.cancel.cancel();
        result
    }

    /// Registration handshake, gated and bounded: nothing else is processed
    /// until the gateway acknowledges, and a silent gateway cannot hold the
    /// reconnect loop hostage.
    async fn register(&self, tunnel: &Arc<dyn Tunnel>, commands: &mut CommandStream) -> Result<()> {
        let mut datasets = vec!["sales".to_string()];
        datasets.extend(
            self.loader
                .list_available()
                .into_iter()
                .filter(|name| name != "sales"),
        );

        tunnel
            .send_control(ControlFrame::Register {
                tenant_id: self.config.tenant_id.clone(),
                version: CLIENT_VERSION.to_string(),
                datasets,
            })
            .await?;

        let ack = timeout(self.config.connect_timeout, commands.recv())
            .await
            .map_err(|_| Error::HandshakeTimeout)?
            .ok_or(Error::ConnectionClosed)?;

        match ack {
            Command::RegisterAck { status, session_id, .. } if status == "ok" => {
                tracing::info!(
                    worker = self.worker_id,
                    session = session_id.as_deref().unwrap_or("-"),
                    "registered with gateway"
                );
                Ok(())
            }
            Command::RegisterAck { status, error, .. } => Err(Error::RegistrationRejected {
                reason: error.unwrap_or(status),
            }),
            other => {
                // Handshake gating: a gateway that sends commands before
                // acknowledging registration gets a reconnect, not service.
                Err(Error::RegistrationRejected {
                    reason: format!("expected register response, got {other:?}"),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::dispatch::tests::test_config;
    use crate::connector::transport::mock::{self, Sent};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn worker(config: Arc<ConnectorConfig>, shutdown: CancellationToken) -> ConnectionWorker {
        let loader = Arc::new(DataLoader::new(
            std::env::temp_dir().join("arrowgate-worker-tests"),
            config.default_synthetic_rows,
        ));
        ConnectionWorker::new(0, config, loader, MetricsHandle::new(), shutdown)
    }

    fn ok_ack() -> Command {
        Command::RegisterAck {
            status: "ok".to_string(),
            session_id: Some("session-1".to_string()),
            error: None,
        }
    }

    #[tokio::test]
    async fn registration_sends_capabilities_and_accepts_ok() {
        let worker = worker(test_config(), CancellationToken::new());
        let (tunnel, mut sent) = mock::pair(true);
        let (tx, mut commands) = mpsc::channel(8);

        tx.send(ok_ack()).await.unwrap();
        let tunnel: Arc<dyn Tunnel> = tunnel;
        worker.register(&tunnel, &mut commands).await.unwrap();

        match sent.recv().await.unwrap() {
            Sent::Control(ControlFrame::Register { tenant_id, version, datasets }) => {
                assert_eq!(tenant_id, "tenant_test");
                assert_eq!(version, CLIENT_VERSION);
                assert!(datasets.contains(&"sales".to_string()));
            }
            other => panic!("expected register frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_registration_fails_the_connection() {
        let worker = worker(test_config(), CancellationToken::new());
        let (tunnel, _sent) = mock::pair(true);
        let (tx, mut commands) = mpsc::channel(8);

        tx.send(Command::RegisterAck {
            status: "error".to_string(),
            session_id: None,
            error: Some("unknown tenant".to_string()),
        })
        .await
        .unwrap();

        let tunnel: Arc<dyn Tunnel> = tunnel;
        let err = worker.register(&tunnel, &mut commands).await.unwrap_err();
        assert!(matches!(err, Error::RegistrationRejected { .. }));
    }

    #[tokio::test]
    async fn command_before_ack_is_not_processed() {
        // Handshake gating: a do_get arriving before the registration ack
        // must fail the handshake instead of being served.
        let worker = worker(test_config(), CancellationToken::new());
        let (tunnel, mut sent) = mock::pair(true);
        let (tx, mut commands) = mpsc::channel(8);

        tx.send(Command::DoGet { request_id: "early".to_string(), ticket: String::new() })
            .await
            .unwrap();

        let tunnel: Arc<dyn Tunnel> = tunnel;
        let err = worker.register(&tunnel, &mut commands).await.unwrap_err();
        assert!(matches!(err, Error::RegistrationRejected { .. }));

        // Only the register frame went out; the early command produced no
        // response frames.
        assert!(matches!(
            sent.recv().await.unwrap(),
            Sent::Control(ControlFrame::Register { .. })
        ));
        assert!(sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_stream_reports_connection_closed() {
        let worker = worker(test_config(), CancellationToken::new());
        let (tunnel, _sent) = mock::pair(true);
        let (tx, mut commands) = mpsc::channel(8);

        tx.send(ok_ack()).await.unwrap();
        drop(tx);

        let tunnel: Arc<dyn Tunnel> = tunnel;
        let err = worker.drive(tunnel, &mut commands).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn drive_serves_commands_until_drop_and_cancels_context() {
        let worker = worker(test_config(), CancellationToken::new());
        let (tunnel, mut sent) = mock::pair(true);
        let (tx, mut commands) = mpsc::channel(8);

        tx.send(ok_ack()).await.unwrap();
        tx.send(Command::Heartbeat { request_id: "hb".to_string(), timestamp: 7 })
            .await
            .unwrap();

        let tunnel: Arc<dyn Tunnel> = tunnel;
        let drive = async {
            // Let the heartbeat get served, then drop the tunnel.
            tokio::time::sleep(Duration::from_millis(100)).await;
            drop(tx);
        };
        let (result, ()) = tokio::join!(worker.drive(tunnel, &mut commands), drive);
        assert!(matches!(result.unwrap_err(), Error::ConnectionClosed));

        // Register frame, then the heartbeat echo.
        assert!(matches!(
            sent.recv().await.unwrap(),
            Sent::Control(ControlFrame::Register { .. })
        ));
        match sent.recv().await.unwrap() {
            Sent::Control(ControlFrame::HeartbeatReply { timestamp, .. }) => {
                assert_eq!(timestamp, 7);
            }
            other => panic!("expected heartbeat reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reconnect_loop_survives_refused_dials_until_shutdown() {
        // Dial a port nothing listens on: every attempt fails fast, and the
        // worker must keep retrying rather than exit.
        let mut config =
            ConnectorConfig::clone(&test_config());
        config.gateway_ws_url = "ws://127.0.0.1:9/ws/connect".to_string();
        config.reconnect_delay = Duration::from_millis(20);
        config.connect_timeout = Duration::from_secs(1);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker(Arc::new(config), shutdown.clone()).run());

        // Long enough for several dial/retry cycles.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!handle.is_finished(), "worker must keep reconnecting");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker must stop on shutdown")
            .unwrap();
    }
}
