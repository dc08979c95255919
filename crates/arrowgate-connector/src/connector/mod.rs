//! The tunnel/protocol engine.
//!
//! ## Structure
//!
//! - [`config`] - CLI/environment configuration, validated once at startup.
//! - [`telemetry`] - `tracing` subscriber setup.
//! - [`transport`] - the [`transport::Tunnel`] seam and its WebSocket and
//!   gRPC implementations.
//! - [`worker`] - per-connection lifecycle state machine with unbounded
//!   reconnect.
//! - [`dispatch`] - per-command task spawning on an active connection.
//! - [`handlers`] - `get_flight_info` and `do_get` request handlers.
//! - [`pool`] - fan-out over the configured number of connection workers.
//! - [`metrics`] - fire-and-forget usage counters and their upload loop.

pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod metrics;
pub mod pool;
pub mod telemetry;
pub mod transport;
pub mod worker;
