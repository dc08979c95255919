//! Shared types and error definitions used across the arrowgate connector.
//!
//! The `common` module defines the transport-neutral pieces of the tunnel
//! protocol that are shared by the gRPC and WebSocket wire encodings.
//!
//! ## Submodules
//!
//! - [`error`] - Centralized error type used throughout connection and
//!   request handling.
//! - [`wire`] - Transport-neutral command/frame types and their mappings onto
//!   both wire encodings.
//! - [`ticket`] - The opaque partition-assignment token codec.
//! - [`partition`] - Pure partition planning functions.

pub mod error;
pub mod partition;
pub mod ticket;
pub mod wire;

pub use error::{Error, Result};

pub mod proto {
    tonic::include_proto!("arrowgate.v1");
}
