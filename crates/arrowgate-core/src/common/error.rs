//! Error types for the arrowgate connector.
//!
//! This module defines the central `Error` enum, which captures all
//! recoverable and reportable error cases within the connector. Connection
//! errors tear down a single tunnel and trigger a reconnect; request errors
//! stay local to one in-flight request and are reported back to the gateway
//! in-band.
//!
//! ## Error Cases
//! - `Transport`: A dial, read, or write failure on the tunnel.
//! - `HandshakeTimeout`: The gateway did not answer a registration in time.
//! - `RegistrationRejected`: The gateway answered a registration with a
//!   non-ok status.
//! - `ConnectionClosed`: The tunnel closed underneath an active connection.
//! - `ChannelError`: An internal communication failure between tasks.
//! - `Dataset`: The dataset provider failed to produce data.
//! - `Codec`: Batch serialization or transfer compression failed.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the arrowgate connector.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// Dial, read, or write failure on the underlying tunnel.
    #[error("Transport error: {context}")]
    Transport { context: String },

    /// The registration handshake did not complete within its bounded wait.
    #[error("Timed out waiting for registration response")]
    HandshakeTimeout,

    /// The gateway refused the registration.
    #[error("Registration rejected: {reason}")]
    RegistrationRejected { reason: String },

    /// The tunnel closed while the connection was active.
    #[error("Connection closed by gateway")]
    ConnectionClosed,

    /// Internal channel send/receive failure (e.g., closed writer task).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The dataset provider could not load or produce the requested data.
    #[error("Dataset error: {context}")]
    Dataset { context: String },

    /// Batch serialization or transfer compression failed.
    #[error("Codec error: {context}")]
    Codec { context: String },
}

impl Error {
    /// Wraps a transport-level failure with context.
    pub fn transport(context: impl core::fmt::Display) -> Self {
        Self::Transport { context: context.to_string() }
    }

    /// Wraps a dataset provider failure with context.
    pub fn dataset(context: impl core::fmt::Display) -> Self {
        Self::Dataset { context: context.to_string() }
    }

    /// Wraps a serialization or compression failure with context.
    pub fn codec(context: impl core::fmt::Display) -> Self {
        Self::Codec { context: context.to_string() }
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        Self::transport(err)
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Self::transport(status)
    }
}
