//! Service registration and per-connection serving.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::command_queue::CommandQueue;
use super::message::{Call, Message, Reply};
use super::wire::{read_record, write_record};
use super::Connection;
use crate::error::{Error, Result};

/// An object whose methods are callable over RPC.
///
/// Arguments and replies are `serde_json` encoded; see [`decode_args`] and
/// [`encode_reply`]. An `Err` is delivered to the caller as
/// [`Error::Remote`].
#[async_trait]
pub trait Service: Send + Sync {
    /// Name used as the `Service` part of `"Service.Method"`.
    fn name(&self) -> &str;

    /// Invokes `method` with the encoded `args` and returns the encoded reply.
    async fn call(&self, method: &str, args: &[u8]) -> std::result::Result<Vec<u8>, String>;
}

/// Set of services served on every connection.
#[derive(Default)]
pub struct Registry {
    services: HashMap<String, Arc<dyn Service>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` under its name. Names must be unique.
    pub fn register(&mut self, service: impl Service + 'static) -> Result<()> {
        let name = service.name().to_owned();
        if name.is_empty() || name.contains('.') {
            return Err(Error::Config(format!("invalid service name {name:?}")));
        }
        if self.services.contains_key(&name) {
            return Err(Error::Config(format!("service already defined: {name}")));
        }
        self.services.insert(name, Arc::new(service));
        Ok(())
    }

    /// Routes `"Service.Method"` to the registered service.
    pub async fn dispatch(&self, method: &str, args: &[u8]) -> std::result::Result<Vec<u8>, String> {
        let Some((service_name, method_name)) = method.split_once('.') else {
            return Err(format!("rpc: service/method request ill-formed: {method}"));
        };
        match self.services.get(service_name) {
            Some(service) => service.call(method_name, args).await,
            None => Err(format!("rpc: can't find service {method}")),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.services.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("services", &names).finish()
    }
}

/// Decodes call arguments inside a [`Service`] implementation.
pub fn decode_args<T: DeserializeOwned>(args: &[u8]) -> std::result::Result<T, String> {
    serde_json::from_slice(args).map_err(|e| format!("rpc: cannot decode arguments: {e}"))
}

/// Encodes a reply inside a [`Service`] implementation.
pub fn encode_reply<T: Serialize>(reply: &T) -> std::result::Result<Vec<u8>, String> {
    serde_json::to_vec(reply).map_err(|e| format!("rpc: cannot encode reply: {e}"))
}

/// Error text for a method a service does not provide.
pub fn unknown_method(service: &str, method: &str) -> String {
    format!("rpc: can't find method {service}.{method}")
}

fn process_call(call: Call, registry: &Registry) -> futures::future::BoxFuture<'_, Reply> {
    Box::pin(async move {
        let result = registry.dispatch(&call.method, &call.body).await;
        if let Err(e) = &result {
            debug!("Call {} failed: {}", call.method, e);
        }
        Reply { seq: call.seq, result }
    })
}

/// Stops the connection's read loop when serving ends or is cancelled.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Serves RPC calls on an authenticated connection until the peer closes it.
///
/// Calls are processed in arrival order. A record that is not a well-formed
/// call ends the connection.
pub async fn serve_connection<S: Connection>(
    stream: S,
    registry: Arc<Registry>,
) -> std::result::Result<(), anyhow::Error> {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (result_sender, mut result_receiver) = mpsc::unbounded_channel::<Reply>();
    let command_queue = CommandQueue::new(process_call, registry, result_sender);

    let mut read_loop = AbortOnDrop(tokio::spawn(async move {
        loop {
            let record = match read_record(&mut reader).await {
                Ok(record) => record,
                Err(e) => {
                    debug!("Message loop broken due to {:?}", e);
                    break;
                }
            };
            match Message::decode(&record) {
                Ok(Message::Call(call)) => {
                    if let Err(e) = command_queue.submit_command(call) {
                        warn!("Dropping connection: {}", e);
                        break;
                    }
                }
                Ok(Message::Reply(_)) => {
                    warn!("Unexpectedly received a Reply instead of a Call");
                    break;
                }
                Err(e) => {
                    warn!("Malformed RPC record: {}", e);
                    break;
                }
            }
        }
    }));

    while let Some(reply) = result_receiver.recv().await {
        let sent = match Message::Reply(reply).encode() {
            Ok(buf) => write_record(&mut writer, &buf).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            return Err(anyhow::anyhow!("Write error {e}"));
        }
    }

    let _ = (&mut read_loop.0).await;
    let _ = writer.shutdown().await;
    Ok(())
}
