//! Command queue for ordered processing of RPC calls
//!
//! Calls read from one connection are dispatched in the exact order they were
//! received, and their replies are emitted in that same order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use super::message::{Call, Reply};
use super::server::Registry;
use crate::error::{Error, Result};

/// Type for asynchronous RPC call processor
pub type AsyncCommandProcessor =
    for<'a> fn(call: Call, registry: &'a Registry) -> futures::future::BoxFuture<'a, Reply>;

/// Queue for sequential processing of RPC calls
///
/// - Guaranteed FIFO call processing
/// - Asynchronous call submission
/// - Separation of call submission from processing
#[derive(Debug, Clone)]
pub struct CommandQueue {
    /// Channel for sending calls
    command_sender: mpsc::UnboundedSender<Call>,
}

impl CommandQueue {
    /// Creates a new command queue with the given processor
    ///
    /// Starts a worker task that processes submitted calls in order and sends
    /// each reply to `result_sender`. The worker stops once every clone of the
    /// queue has been dropped and the backlog is drained.
    pub fn new(
        processor: AsyncCommandProcessor,
        registry: Arc<Registry>,
        result_sender: mpsc::UnboundedSender<Reply>,
    ) -> Self {
        let (command_sender, mut command_receiver) = mpsc::unbounded_channel::<Call>();

        tokio::spawn(async move {
            while let Some(call) = command_receiver.recv().await {
                trace!("Processing call {} seq:{}", call.method, call.seq);
                let reply = processor(call, registry.as_ref()).await;
                if let Err(e) = result_sender.send(reply) {
                    error!("Failed to send call processing result: {:?}", e);
                    break;
                }
            }
            debug!("Command queue handler finished");
        });

        Self { command_sender }
    }

    /// Submits a call to the queue for processing
    ///
    /// Returns an error if the worker has stopped.
    pub fn submit_command(&self, call: Call) -> Result<()> {
        self.command_sender
            .send(call)
            .map_err(|e| Error::Protocol(format!("Failed to queue call: {e}")))
    }
}
