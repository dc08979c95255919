//! In-memory tunnel for unit tests: records everything the protocol layer
//! sends and can inject failures for a chosen request id.

use super::Tunnel;
use arrowgate_core::wire::ControlFrame;
use arrowgate_core::{Error, Result};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One unit observed on the mock tunnel's outbound side.
#[derive(Debug)]
pub enum Sent {
    Control(ControlFrame),
    Payload {
        request_id: String,
        partition: u32,
        data: Bytes,
    },
}

pub struct MockTunnel {
    multiplexed: bool,
    sent: mpsc::UnboundedSender<Sent>,
    /// Sends belonging to this request id fail with a transport error.
    fail_request: Option<String>,
}

/// Builds a mock tunnel plus the receiver observing its outbound units.
pub fn pair(multiplexed: bool) -> (Arc<MockTunnel>, mpsc::UnboundedReceiver<Sent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(MockTunnel { multiplexed, sent: tx, fail_request: None }), rx)
}

/// Like [`pair`], but sends for `fail_request` error out, simulating a
/// request-scoped fault.
pub fn failing_pair(
    multiplexed: bool,
    fail_request: &str,
) -> (Arc<MockTunnel>, mpsc::UnboundedReceiver<Sent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Arc::new(MockTunnel {
            multiplexed,
            sent: tx,
            fail_request: Some(fail_request.to_string()),
        }),
        rx,
    )
}

impl MockTunnel {
    fn check(&self, request_id: Option<&str>) -> Result<()> {
        match (&self.fail_request, request_id) {
            (Some(bad), Some(id)) if bad == id => {
                Err(Error::transport(format!("injected failure for {id}")))
            }
            _ => Ok(()),
        }
    }
}

#[tonic::async_trait]
impl Tunnel for MockTunnel {
    fn multiplexed(&self) -> bool {
        self.multiplexed
    }

    async fn send_control(&self, frame: ControlFrame) -> Result<()> {
        self.check(control_request_id(&frame))?;
        self.sent
            .send(Sent::Control(frame))
            .map_err(|_| Error::ChannelError { context: "mock receiver dropped".to_string() })
    }

    async fn send_payload(&self, request_id: &str, partition: u32, data: Bytes) -> Result<()> {
        self.check(Some(request_id))?;
        self.sent
            .send(Sent::Payload { request_id: request_id.to_string(), partition, data })
            .map_err(|_| Error::ChannelError { context: "mock receiver dropped".to_string() })
    }
}

fn control_request_id(frame: &ControlFrame) -> Option<&str> {
    match frame {
        ControlFrame::Register { .. } => None,
        ControlFrame::HeartbeatReply { request_id, .. }
        | ControlFrame::FlightInfo { request_id, .. }
        | ControlFrame::FlightInfoError { request_id, .. }
        | ControlFrame::StreamStart { request_id, .. }
        | ControlFrame::StreamEnd { request_id, .. }
        | ControlFrame::StreamAbort { request_id, .. } => Some(request_id.as_str()),
    }
}
