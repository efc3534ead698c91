//! Client side: dialing an authenticated connection and a self-healing RPC client.
//!
//! [`dial`] opens a TLS connection to the server named in a client
//! configuration file and presents the configured credentials. It never
//! retries.
//!
//! [`ReconnectingClient`] owns at most one live [`RpcClient`]. When a call
//! finds the connection shut down, the client dials again and retries that
//! call exactly once. Concurrent callers that observe the same dead connection
//! share a single dial: the first one to take the lock dials, the others find a
//! newer session and reuse it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, error, info};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::protocol::handshake;
use crate::protocol::rpc::{BoxedConnection, RpcClient};
use crate::tls;

/// Default pause after a failed dial, throttling reconnect storms.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(4);

/// Opens an authenticated connection using the client configuration at `config_path`.
///
/// The configuration is loaded fresh on every call. On failure the partially
/// opened connection is dropped, which closes it.
pub async fn dial(config_path: impl AsRef<Path>) -> Result<TlsStream<TcpStream>> {
    let config = ClientConfig::load(config_path.as_ref())?;
    let connector = TlsConnector::from(tls::client_config(&config.ca_cert)?);
    let server_name = tls::server_name(&config.host)?;

    let socket = TcpStream::connect(&config.host).await?;
    let _ = socket.set_nodelay(true);
    let mut stream = connector.connect(server_name, socket).await?;

    handshake::present_credentials(&mut stream, &config.user, &config.pwd).await?;
    Ok(stream)
}

/// Source of fresh authenticated connections for a [`ReconnectingClient`].
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self) -> Result<BoxedConnection>;
}

/// Dials with the client configuration file at `config_path`.
#[derive(Clone, Debug)]
pub struct ConfigDialer {
    pub config_path: PathBuf,
}

#[async_trait]
impl Dialer for ConfigDialer {
    async fn dial(&self) -> Result<BoxedConnection> {
        let stream = dial(&self.config_path).await?;
        Ok(Box::new(stream))
    }
}

/// A live connection together with the generation it was dialed in.
#[derive(Clone, Debug)]
struct Session {
    generation: u64,
    client: Arc<RpcClient>,
}

#[derive(Default)]
struct State {
    current: Option<Session>,
    generation: u64,
}

/// RPC client that reconnects on connection loss and retries a failed call once.
pub struct ReconnectingClient<D: Dialer = ConfigDialer> {
    dialer: D,
    reconnect_delay: Duration,
    state: tokio::sync::Mutex<State>,
}

impl ReconnectingClient<ConfigDialer> {
    /// Creates a client for the configuration file at `config_path`.
    ///
    /// No connection is made until the first call.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self::with_dialer(ConfigDialer { config_path: config_path.into() })
    }
}

impl<D: Dialer> ReconnectingClient<D> {
    pub fn with_dialer(dialer: D) -> Self {
        Self {
            dialer,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            state: tokio::sync::Mutex::new(State::default()),
        }
    }

    /// Sets the pause after a failed dial.
    pub fn with_reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay = reconnect_delay;
        self
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Calls `method` (`"Service.Method"`) with `args`.
    ///
    /// Only [`crate::Error::Shutdown`] triggers a reconnect, followed by exactly
    /// one retry whose outcome is returned as is. Any other error, including
    /// errors returned by the remote service, is returned unchanged.
    pub async fn call<A, R>(&self, method: &str, args: &A) -> Result<R>
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let session = match self.current().await {
            Some(session) => session,
            None => self.reconnect(None).await?,
        };

        match session.client.call(method, args).await {
            Err(e) if e.is_shutdown() => {
                debug!("Call {} found the connection shut down, reconnecting", method);
            }
            result => return result,
        }

        let session = self.reconnect(Some(session.generation)).await?;
        session.client.call(method, args).await
    }

    /// Closes the current connection, if any.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.current.take() {
            Some(session) => session.client.close().await,
            None => Ok(()),
        }
    }

    /// True while a connection is held.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.current.is_some()
    }

    async fn current(&self) -> Option<Session> {
        self.state.lock().await.current.clone()
    }

    /// Dials a new connection unless another caller already replaced the
    /// session seen as `stale`.
    ///
    /// The lock is held across the dial and the delay after a failure, so at
    /// most one dial is in flight per client.
    async fn reconnect(&self, stale: Option<u64>) -> Result<Session> {
        let mut state = self.state.lock().await;

        if let Some(session) = &state.current {
            if Some(session.generation) != stale {
                return Ok(session.clone());
            }
        }

        match self.dialer.dial().await {
            Ok(conn) => {
                info!("Connected to server.");
                state.generation += 1;
                let session =
                    Session { generation: state.generation, client: Arc::new(RpcClient::new(conn)) };
                state.current = Some(session.clone());
                Ok(session)
            }
            Err(e) => {
                error!(
                    "Failed to connect to server (sleeping {:?}): {}",
                    self.reconnect_delay, e
                );
                state.current = None;
                tokio::time::sleep(self.reconnect_delay).await;
                Err(e)
            }
        }
    }
}

impl<D: Dialer> std::fmt::Debug for ReconnectingClient<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectingClient")
            .field("reconnect_delay", &self.reconnect_delay)
            .finish_non_exhaustive()
    }
}
