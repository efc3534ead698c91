//! Error types shared by the handshake, the credential store and the RPC layer.
//!
//! The variants follow the failure classes of the transport:
//!
//! - `Protocol`: a malformed or oversized frame. Fatal to the connection.
//! - `UnknownUser` / `AuthFailed`: the handshake was rejected. Fatal to the
//!   connection; the remote peer only observes a closed stream.
//! - `Config`: bad configuration, certificate or key material. Fatal to the
//!   operation that loaded it.
//! - `Transport`: an underlying connect/read/write failure.
//! - `Shutdown`: the RPC connection is known to be dead. This is the only error
//!   that makes [`crate::client::ReconnectingClient`] reconnect and retry.
//! - `Remote`: the server processed the call and returned an error.

use std::io;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the authenticated transport.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or oversized handshake frame or RPC record.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The presented user name has no credential on the server.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// The presented password does not match the stored hash.
    #[error("authentication failed for user: {0}")]
    AuthFailed(String),

    /// Malformed configuration, certificate or key material.
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying connect, read or write failure.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// TLS configuration failure.
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    /// JSON encoding or decoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Password hashing failure.
    #[error("password hash error: {0}")]
    Hash(String),

    /// The RPC connection is shut down.
    #[error("connection is shut down")]
    Shutdown,

    /// Error returned by the remote service.
    #[error("remote error: {0}")]
    Remote(String),
}

impl Error {
    /// Returns true for the error class that signals a dead RPC connection.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Error::Shutdown)
    }
}
