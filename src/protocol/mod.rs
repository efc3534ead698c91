//! Wire protocols spoken on an authenticated connection.
//!
//! - `frame`: 2-byte length-prefixed messages used during the handshake.
//! - `handshake`: the user name / password exchange that must complete before
//!   a connection is trusted.
//! - `rpc`: record-marked RPC messages, service dispatch and the client side
//!   connection multiplexer used once the handshake has succeeded.

pub mod frame;
pub mod handshake;
pub mod rpc;
