//! Multiplexed gRPC tunnel.
//!
//! One bidirectional stream per connection: the connector sends
//! `ConnectorMessage` envelopes, the gateway pushes `GatewayCommand`
//! envelopes back. Every unit carries its own request identity (and payload
//! chunks their partition index), so any number of streaming responses may
//! interleave on one tunnel; this transport reports `multiplexed() == true`.

use super::{CommandStream, Tunnel};
use arrowgate_core::proto::connector_tunnel_client::ConnectorTunnelClient;
use arrowgate_core::wire::{Command, ControlFrame, payload_envelope};
use arrowgate_core::{Error, Result, proto};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Endpoint;

const OUTBOUND_BUFFER: usize = 64;
const INBOUND_BUFFER: usize = 64;

struct GrpcTunnel {
    outbound: mpsc::Sender<proto::ConnectorMessage>,
}

#[tonic::async_trait]
impl Tunnel for GrpcTunnel {
    fn multiplexed(&self) -> bool {
        true
    }

    async fn send_control(&self, frame: ControlFrame) -> Result<()> {
        self.outbound
            .send(frame.into_envelope())
            .await
            .map_err(|_| Error::ChannelError { context: "tunnel stream closed".to_string() })
    }

    async fn send_payload(&self, request_id: &str, partition: u32, data: Bytes) -> Result<()> {
        self.outbound
            .send(payload_envelope(request_id, partition, data))
            .await
            .map_err(|_| Error::ChannelError { context: "tunnel stream closed".to_string() })
    }
}

/// Dials the gateway and opens the bidirectional tunnel stream. Both the
/// TCP/HTTP2 dial and the stream handshake are bounded by `timeout`.
pub async fn connect(uri: &str, timeout: Duration) -> Result<(Arc<dyn Tunnel>, CommandStream)> {
    let endpoint = Endpoint::from_shared(uri.to_string())
        .map_err(Error::transport)?
        .connect_timeout(timeout);

    let channel = tokio::time::timeout(timeout, endpoint.connect())
        .await
        .map_err(|_| Error::transport(format!("dial timed out after {timeout:?}")))??;

    let mut client = ConnectorTunnelClient::new(channel);

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let response = tokio::time::timeout(
        timeout,
        client.open_tunnel(ReceiverStream::new(outbound_rx)),
    )
    .await
    .map_err(|_| Error::transport(format!("tunnel open timed out after {timeout:?}")))?
    .map_err(Error::from)?;

    let mut source = response.into_inner();
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);

    tokio::spawn(async move {
        loop {
            match source.message().await {
                Ok(Some(envelope)) => {
                    if inbound_tx
                        .send(Command::from_envelope(envelope))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => break,
                Err(status) => {
                    tracing::debug!(%status, "tunnel read failed");
                    break;
                }
            }
        }
    });

    Ok((Arc::new(GrpcTunnel { outbound: outbound_tx }), inbound_rx))
}
