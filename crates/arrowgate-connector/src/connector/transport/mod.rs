//! The tunnel transport abstraction.
//!
//! One protocol, two wire encodings. The [`Tunnel`] trait is the seam:
//! everything above it - dispatcher, handlers, planner - sends control
//! frames and payload chunks without knowing which encoding carries them.
//!
//! The difference that *is* allowed to leak is [`Tunnel::multiplexed`],
//! because it is a first-class protocol fact rather than an implementation
//! detail: the linear WebSocket tunnel ships payload as raw binary frames
//! with no embedded request id, so only one streaming response may be in
//! flight per connection, while the gRPC tunnel's self-describing envelopes
//! interleave freely. The dispatcher consults this flag to decide whether
//! streaming responses need a per-connection serialization lock.
//!
//! Both implementations funnel outbound units through a single writer task,
//! so concurrent handler tasks never interleave partial frames. Inbound
//! units surface as [`Command`]s on a channel; the channel closing is the
//! transport-loss signal that sends the connection worker back to its
//! reconnect loop.

pub mod grpc;
pub mod websocket;

#[cfg(test)]
pub mod mock;

use arrowgate_core::Result;
use arrowgate_core::wire::{Command, ControlFrame};
use bytes::Bytes;
use tokio::sync::mpsc;

/// Inbound side of a tunnel: gateway commands in arrival order. Closes when
/// the transport is lost.
pub type CommandStream = mpsc::Receiver<Command>;

/// Outbound side of a tunnel.
///
/// Implementations must be cheap to share: handler tasks clone the
/// `Arc<dyn Tunnel>` and send concurrently.
#[tonic::async_trait]
pub trait Tunnel: Send + Sync {
    /// Whether payload units are self-describing (carry their own request
    /// identity) and may therefore interleave across requests.
    fn multiplexed(&self) -> bool;

    /// Sends one control frame.
    async fn send_control(&self, frame: ControlFrame) -> Result<()>;

    /// Sends one payload chunk for `request_id`. Linear encodings ignore the
    /// identity (the frame itself carries none); multiplexed encodings embed
    /// it in the envelope.
    async fn send_payload(&self, request_id: &str, partition: u32, data: Bytes) -> Result<()>;
}
