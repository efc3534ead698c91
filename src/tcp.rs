//! The TCP module provides the authenticated TLS listener and the RPC serving loop.
//!
//! This module implements a listener that:
//! - Accepts TCP connections and runs the TLS handshake
//! - Runs the user name / password handshake against the credential store
//! - Hands out only connections bound to a verified user
//! - Serves RPC calls on every authenticated connection in its own task
//!
//! `accept` authenticates one connection at a time. A peer that stalls during
//! the handshake delays the next accept until the handshake timeout expires;
//! callers that need concurrent acceptance must run several accept loops.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::credentials::{CredentialStore, DEFAULT_REFRESH_INTERVAL};
use crate::error::{Error, Result};
use crate::protocol::handshake;
use crate::protocol::rpc::{self, Registry};
use crate::{paths, tls};

/// Default bound on the TLS plus credential handshake of a single connection.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A connection whose peer presented valid credentials.
#[derive(Debug)]
pub struct AuthenticatedConnection {
    /// Encrypted stream, ready for RPC traffic
    pub stream: TlsStream<TcpStream>,
    /// User name the peer authenticated as
    pub user: String,
    /// Peer network address
    pub peer_addr: SocketAddr,
}

/// TLS listener that authenticates every connection before handing it out.
pub struct AuthTcpListener {
    /// TCP Listener for accepting incoming connections
    listener: TcpListener,
    /// TLS acceptor holding the server identity
    acceptor: TlsAcceptor,
    /// User name to password hash mapping
    credentials: Arc<CredentialStore>,
    /// Bound on a single connection's handshake
    handshake_timeout: Duration,
}

/// Interface for authenticated RPC servers over TCP.
#[async_trait]
pub trait RpcTcp: Send + Sync {
    /// Returns the actual port number on which the server is listening
    ///
    /// This is especially useful when binding to port 0, which allows the OS
    /// to assign any available port.
    fn get_listen_port(&self) -> u16;

    /// Returns the IP address on which the server is listening
    fn get_listen_ip(&self) -> IpAddr;

    /// Accepts and authenticates connections forever, serving RPC calls on
    /// each authenticated connection in its own task.
    ///
    /// A failed accept or handshake is logged and the loop continues.
    async fn handle_forever(&mut self, registry: Arc<Registry>) -> io::Result<()>;
}

impl AuthTcpListener {
    /// Loads the server configuration and identity from `base_dir`, binds
    /// `ListenAddr` and starts a credential store on `<base_dir>/clients`.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn listen(base_dir: impl AsRef<Path>) -> Result<AuthTcpListener> {
        let base_dir = base_dir.as_ref();
        let credentials =
            CredentialStore::new(paths::client_pwd_dir(base_dir), DEFAULT_REFRESH_INTERVAL);
        AuthTcpListener::listen_with_store(base_dir, credentials).await
    }

    /// Like [`AuthTcpListener::listen`] with an existing credential store.
    pub async fn listen_with_store(
        base_dir: impl AsRef<Path>,
        credentials: Arc<CredentialStore>,
    ) -> Result<AuthTcpListener> {
        let base_dir = base_dir.as_ref();
        let server_config = ServerConfig::load(base_dir)?;
        let acceptor = TlsAcceptor::from(tls::load_server_config(base_dir)?);

        let listener = TcpListener::bind(&server_config.listen_addr).await?;
        info!("Listening on {:?}", listener.local_addr()?);

        Ok(AuthTcpListener {
            listener,
            acceptor,
            credentials,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    /// Sets the bound on a single connection's handshake.
    pub fn with_handshake_timeout(&mut self, handshake_timeout: Duration) {
        self.handshake_timeout = handshake_timeout;
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Accepts one connection and authenticates it.
    ///
    /// On any failure the connection is closed without a reply, the reason is
    /// logged at error level and returned. The peer cannot tell an unknown user from a wrong
    /// password.
    pub async fn accept(&mut self) -> Result<AuthenticatedConnection> {
        let (socket, peer_addr) = match self.listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                return Err(e.into());
            }
        };
        let _ = socket.set_nodelay(true);
        debug!("Accepting socket from {}", peer_addr);

        let handshake = async {
            let mut stream = self.acceptor.accept(socket).await?;
            let user = handshake::authenticate(&mut stream, &self.credentials).await?;
            Ok::<_, Error>((stream, user))
        };
        let result = match tokio::time::timeout(self.handshake_timeout, handshake).await {
            Ok(result) => result,
            Err(_) => Err(Error::Transport(io::Error::new(
                io::ErrorKind::TimedOut,
                "handshake timed out",
            ))),
        };

        match result {
            Ok((stream, user)) => {
                info!("Accepting connection for user: {} from {}", user, peer_addr);
                Ok(AuthenticatedConnection { stream, user, peer_addr })
            }
            Err(e) => {
                // The stream was dropped with the handshake future, closing it.
                error!("Rejected connection from {}: {}", peer_addr, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl RpcTcp for AuthTcpListener {
    fn get_listen_port(&self) -> u16 {
        self.listener.local_addr().map(|addr| addr.port()).unwrap_or_default()
    }

    fn get_listen_ip(&self) -> IpAddr {
        self.listener
            .local_addr()
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::from([0, 0, 0, 0]))
    }

    async fn handle_forever(&mut self, registry: Arc<Registry>) -> io::Result<()> {
        loop {
            let conn = match self.accept().await {
                Ok(conn) => conn,
                // Already logged by `accept`.
                Err(_) => continue,
            };
            let registry = registry.clone();
            tokio::spawn(async move {
                if let Err(e) = rpc::serve_connection(conn.stream, registry).await {
                    debug!("Connection for user {} closed: {:?}", conn.user, e);
                }
            });
        }
    }
}

/// Listens with the configuration in `base_dir` and serves `registry` forever.
pub async fn serve_forever(base_dir: impl AsRef<Path>, registry: Registry) -> Result<()> {
    let mut listener = AuthTcpListener::listen(base_dir).await.map_err(|e| {
        error!("Failed to listen: {}", e);
        e
    })?;
    listener.handle_forever(Arc::new(registry)).await?;
    Ok(())
}
