//! Linear WebSocket tunnel.
//!
//! Control messages travel as JSON text frames, payload chunks as raw binary
//! frames. Binary frames carry no request identity, so this transport
//! reports `multiplexed() == false` and the dispatcher serializes streaming
//! responses on top of it.

use super::{CommandStream, Tunnel};
use arrowgate_core::wire::{Command, ControlFrame};
use arrowgate_core::{Error, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Buffered units between handler tasks and the writer task. Modest on
/// purpose: a slow tunnel should push back on streaming handlers rather
/// than buffer a dataset in memory.
const OUTBOUND_BUFFER: usize = 64;
const INBOUND_BUFFER: usize = 64;

enum Outbound {
    Text(String),
    Binary(Bytes),
}

struct WebSocketTunnel {
    outbound: mpsc::Sender<Outbound>,
}

#[tonic::async_trait]
impl Tunnel for WebSocketTunnel {
    fn multiplexed(&self) -> bool {
        false
    }

    async fn send_control(&self, frame: ControlFrame) -> Result<()> {
        self.outbound
            .send(Outbound::Text(frame.to_ws_text()))
            .await
            .map_err(|_| Error::ChannelError { context: "tunnel writer closed".to_string() })
    }

    async fn send_payload(&self, _request_id: &str, _partition: u32, data: Bytes) -> Result<()> {
        self.outbound
            .send(Outbound::Binary(data))
            .await
            .map_err(|_| Error::ChannelError { context: "tunnel writer closed".to_string() })
    }
}

/// Dials the gateway over WebSocket. The dial itself is bounded by
/// `timeout`; a stalled endpoint cannot wedge the reconnect loop.
pub async fn connect(url: &str, timeout: Duration) -> Result<(Arc<dyn Tunnel>, CommandStream)> {
    let (stream, _response) = tokio::time::timeout(timeout, connect_async(url))
        .await
        .map_err(|_| Error::transport(format!("dial timed out after {timeout:?}")))?
        .map_err(Error::transport)?;

    let (sink, source) = stream.split();

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);

    tokio::spawn(write_loop(sink, outbound_rx));
    tokio::spawn(read_loop(source, inbound_tx));

    Ok((Arc::new(WebSocketTunnel { outbound: outbound_tx }), inbound_rx))
}

type WsSink =
    futures::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = futures::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Single writer task: serializes all outbound frames from concurrent
/// handler tasks onto the socket.
async fn write_loop(mut sink: WsSink, mut outbound: mpsc::Receiver<Outbound>) {
    while let Some(unit) = outbound.recv().await {
        let message = match unit {
            Outbound::Text(text) => Message::Text(text.into()),
            Outbound::Binary(data) => Message::Binary(data),
        };
        if let Err(err) = sink.send(message).await {
            tracing::debug!(%err, "tunnel write failed");
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(mut source: WsSource, inbound: mpsc::Sender<Command>) {
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => match Command::from_ws_text(text.as_str()) {
                Some(command) => {
                    if inbound.send(command).await.is_err() {
                        break;
                    }
                }
                None => tracing::warn!("discarding undecodable control frame"),
            },
            Ok(Message::Binary(_)) => {
                tracing::warn!("discarding unexpected binary frame from gateway");
            }
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by the protocol layer.
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(%err, "tunnel read failed");
                break;
            }
        }
    }
    // Dropping `inbound` closes the command stream, which the connection
    // worker observes as transport loss.
}
