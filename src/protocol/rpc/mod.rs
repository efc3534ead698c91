//! Minimal RPC layer carried over an authenticated connection.
//!
//! Once the handshake has succeeded, both directions of the stream carry
//! record-marked messages:
//!
//! 1. Message framing using the Record Marking Standard (4-byte header, last
//!    fragment bit, 31-bit length)
//! 2. A binary envelope distinguishing calls from replies, with a sequence
//!    number used to match replies to outstanding calls
//! 3. `serde_json` encoded argument and reply bodies
//! 4. Named services registered on the server, dispatched by `"Service.Method"`
//! 5. Ordered command processing with FIFO guarantees per connection
//!
//! The client half multiplexes concurrent calls over one connection and
//! reports [`crate::Error::Shutdown`] for every call once the connection is
//! known to be dead.

mod client;
mod command_queue;
mod message;
mod server;
mod wire;

use tokio::io::{AsyncRead, AsyncWrite};

pub use client::RpcClient;
pub use message::{Call, Message, MessageType, Reply, ReplyStatus};
pub use server::{decode_args, encode_reply, serve_connection, unknown_method, Registry, Service};
pub use wire::{read_record, write_record};

/// Largest record accepted from a peer.
pub const MAX_RPC_RECORD_LENGTH: usize = 4 * 1024 * 1024;

/// Byte stream an RPC connection can run on.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Connection for T {}

/// Type-erased connection, as produced by a dialer.
pub type BoxedConnection = Box<dyn Connection>;
