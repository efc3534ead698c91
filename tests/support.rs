#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use trustrpc::client::Dialer;
use trustrpc::config::{ClientConfig, PwdFile};
use trustrpc::protocol::rpc::{self, decode_args, encode_reply, unknown_method, BoxedConnection};
use trustrpc::{password, paths, provision, Error, Registry, Service};

/// Test service: `Echo.Echo` returns its argument, `Echo.Fail` always fails,
/// `Echo.Sleep` waits the given number of milliseconds and returns it.
#[derive(Default)]
pub struct EchoService;

#[async_trait]
impl Service for EchoService {
    fn name(&self) -> &str {
        "Echo"
    }

    async fn call(&self, method: &str, args: &[u8]) -> Result<Vec<u8>, String> {
        match method {
            "Echo" => {
                let text: String = decode_args(args)?;
                encode_reply(&text)
            }
            "Fail" => Err("echo failed on purpose".to_string()),
            "Sleep" => {
                let millis: u64 = decode_args(args)?;
                tokio::time::sleep(Duration::from_millis(millis)).await;
                encode_reply(&millis)
            }
            other => Err(unknown_method(self.name(), other)),
        }
    }
}

pub fn echo_registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    registry.register(EchoService).expect("register echo service");
    Arc::new(registry)
}

/// What the next dial of a [`DuplexDialer`] produces.
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    /// An in-memory connection served by the echo registry.
    Serve,
    /// A connection whose server end is already closed.
    Hangup,
    /// A failed dial.
    Refuse,
}

/// Dialer producing in-memory connections, counting every dial.
pub struct DuplexDialer {
    registry: Arc<Registry>,
    dials: AtomicUsize,
    script: Mutex<VecDeque<Behavior>>,
    fallback: Behavior,
    dial_delay: Duration,
    servers: Mutex<Vec<JoinHandle<()>>>,
}

impl DuplexDialer {
    pub fn new(fallback: Behavior) -> Self {
        Self {
            registry: echo_registry(),
            dials: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            fallback,
            dial_delay: Duration::ZERO,
            servers: Mutex::new(Vec::new()),
        }
    }

    /// Behaviors used by the next dials, in order, before falling back.
    pub fn scripted(behaviors: &[Behavior], fallback: Behavior) -> Self {
        let dialer = Self::new(fallback);
        dialer.script.lock().unwrap().extend(behaviors.iter().copied());
        dialer
    }

    pub fn with_dial_delay(mut self, dial_delay: Duration) -> Self {
        self.dial_delay = dial_delay;
        self
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Drops the server end of every connection served so far.
    pub fn kill_connections(&self) {
        for server in self.servers.lock().unwrap().drain(..) {
            server.abort();
        }
    }
}

#[async_trait]
impl Dialer for DuplexDialer {
    async fn dial(&self) -> trustrpc::Result<BoxedConnection> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.dial_delay).await;

        let behavior = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);
        match behavior {
            Behavior::Serve => {
                let (client, server) = tokio::io::duplex(64 * 1024);
                let registry = self.registry.clone();
                let handle = tokio::spawn(async move {
                    let _ = rpc::serve_connection(server, registry).await;
                });
                self.servers.lock().unwrap().push(handle);
                Ok(Box::new(client))
            }
            Behavior::Hangup => {
                let (client, server) = tokio::io::duplex(64 * 1024);
                drop(server);
                Ok(Box::new(client))
            }
            Behavior::Refuse => Err(Error::Transport(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}

/// Writes a credential file for `user` holding the hash of `pwd`.
pub fn enroll(clients_dir: &Path, user: &str, pwd: &[u8]) {
    let pwd_file = PwdFile { pwd_hash: password::hash(pwd).expect("hash password") };
    pwd_file.save(&paths::pwd_file_in(clients_dir, user)).expect("save credential file");
}

/// A provisioned server directory whose server listens on an ephemeral port.
pub struct ServerDir {
    pub dir: tempfile::TempDir,
}

impl ServerDir {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        provision::init_server(dir.path(), "127.0.0.1:0", "127.0.0.1:0").expect("init server");
        Self { dir }
    }

    pub fn base(&self) -> &Path {
        self.dir.path()
    }

    pub fn clients_dir(&self) -> PathBuf {
        paths::client_pwd_dir(self.base())
    }

    /// Writes a client configuration for `user` pointing at `addr`.
    pub fn client_config(&self, addr: std::net::SocketAddr, user: &str, pwd: &[u8]) -> PathBuf {
        let config = ClientConfig {
            host: addr.to_string(),
            user: user.to_string(),
            pwd: pwd.to_vec(),
            ca_cert: trustrpc::tls::load_ca_cert(self.base()).expect("load ca cert"),
        };
        let path = paths::client_config_file(self.base(), user);
        config.save(&path).expect("save client config");
        path
    }
}

/// In-memory sink for log output produced while a capture guard is alive.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Routes this thread's log output into a buffer until the guard is dropped.
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
