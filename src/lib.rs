//! trustrpc - password-authenticated RPC transport over TLS
//!
//! This library connects a fleet of clients to a server over encrypted
//! connections, and binds every accepted connection to a verified user name
//! before any RPC traffic is allowed to flow.
//!
//! ## Main Components
//!
//! - `tcp`: The authenticated listener. Each accepted TLS connection must
//!   present a user name and password that match the server's credential store
//!   before it is handed to the RPC serving loop.
//!
//! - `credentials`: In-memory cache of user name to password hash, refreshed
//!   from a directory of per-user credential files by a background task, so
//!   users can be added or revoked without restarting the server.
//!
//! - `client`: The dial routine and a self-healing RPC client that reconnects
//!   after connection loss and retries the interrupted call once.
//!
//! - `protocol`: Handshake framing and the RPC layer (record marking, message
//!   envelope, service dispatch, client connection multiplexing).
//!
//! - `config`, `paths`, `tls`, `provision`: configuration files, the server
//!   directory layout, TLS identity material and client enrollment.
//!
//! ## Usage
//!
//! On the server, create a base directory with `provision::init_server`,
//! enroll users with `provision::add_client`, register services in a
//! `protocol::rpc::Registry` and run `tcp::serve_forever`. On a client, create
//! a `client::ReconnectingClient` from the generated client configuration file
//! and issue calls.

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod password;
pub mod paths;
pub mod protocol;
pub mod provision;
pub mod tcp;
pub mod tls;

pub use client::ReconnectingClient;
pub use credentials::CredentialStore;
pub use error::{Error, Result};
pub use protocol::rpc::{Registry, Service};
pub use tcp::{AuthTcpListener, RpcTcp};
