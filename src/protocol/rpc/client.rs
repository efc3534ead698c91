//! Client end of an RPC connection.
//!
//! One reader task per connection matches replies to outstanding calls by
//! sequence number. As soon as the reader stops (peer closed, transport error,
//! malformed record) or a write fails, the client is shut down: every pending
//! and every future call fails with [`Error::Shutdown`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use super::message::{Call, Message};
use super::wire::{read_record, write_record};
use super::{BoxedConnection, Connection};
use crate::error::{Error, Result};

type ReplySender = oneshot::Sender<Result<Vec<u8>>>;

#[derive(Default)]
struct Pending {
    calls: HashMap<u64, ReplySender>,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<Pending>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the connection dead and fails all outstanding calls.
    fn terminate(&self) {
        let calls = {
            let mut pending = self.lock();
            pending.shutdown = true;
            std::mem::take(&mut pending.calls)
        };
        for (_, sender) in calls {
            let _ = sender.send(Err(Error::Shutdown));
        }
    }
}

/// Multiplexing RPC client over a single connection.
pub struct RpcClient {
    writer: tokio::sync::Mutex<WriteHalf<BoxedConnection>>,
    shared: Arc<Shared>,
    next_seq: AtomicU64,
    reader: JoinHandle<()>,
}

impl RpcClient {
    /// Wraps an authenticated connection. Must be called within a tokio runtime.
    pub fn new<S: Connection>(stream: S) -> Self {
        let stream: BoxedConnection = Box::new(stream);
        let (reader, writer) = tokio::io::split(stream);
        let shared = Arc::new(Shared::default());
        let reader = tokio::spawn(read_replies(reader, shared.clone()));
        Self {
            writer: tokio::sync::Mutex::new(writer),
            shared,
            next_seq: AtomicU64::new(0),
            reader,
        }
    }

    /// Calls `method` (`"Service.Method"`) with JSON encoded `args`.
    pub async fn call<A, R>(&self, method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = serde_json::to_vec(args)?;
        let reply = self.call_raw(method, body).await?;
        Ok(serde_json::from_slice(&reply)?)
    }

    /// Calls `method` with an already encoded body and returns the encoded reply.
    pub async fn call_raw(&self, method: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        {
            let mut pending = self.shared.lock();
            if pending.shutdown {
                return Err(Error::Shutdown);
            }
            pending.calls.insert(seq, sender);
        }

        let record = Message::Call(Call { seq, method: method.to_owned(), body }).encode()?;
        let sent = {
            let mut writer = self.writer.lock().await;
            write_record(&mut *writer, &record).await
        };
        if let Err(e) = sent {
            debug!("Failed to send call {}: {}", method, e);
            self.shared.terminate();
            return Err(Error::Shutdown);
        }

        receiver.await.unwrap_or(Err(Error::Shutdown))
    }

    /// True once the connection is known to be dead or has been closed.
    pub fn is_shutdown(&self) -> bool {
        self.shared.lock().shutdown
    }

    /// Closes the connection. Outstanding calls fail with [`Error::Shutdown`].
    pub async fn close(&self) -> Result<()> {
        self.shared.terminate();
        self.reader.abort();
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        Ok(())
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient").field("shutdown", &self.is_shutdown()).finish()
    }
}

async fn read_replies(mut reader: ReadHalf<BoxedConnection>, shared: Arc<Shared>) {
    loop {
        let reply = match read_record(&mut reader).await.and_then(|r| Message::decode(&r)) {
            Ok(Message::Reply(reply)) => reply,
            Ok(Message::Call(_)) => {
                debug!("Unexpectedly received a Call instead of a Reply");
                break;
            }
            Err(e) => {
                debug!("Reply loop broken due to {:?}", e);
                break;
            }
        };

        let sender = shared.lock().calls.remove(&reply.seq);
        match sender {
            Some(sender) => {
                let _ = sender.send(reply.result.map_err(Error::Remote));
            }
            None => debug!("Dropping reply for unknown seq {}", reply.seq),
        }
    }
    shared.terminate();
}
