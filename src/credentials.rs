//! In-memory credential store refreshed from a directory of credential files.
//!
//! Every file `<clients_dir>/<user>.json` holds the password hash for `<user>`.
//! The files are the source of truth; the store is a cache that a background
//! task brings up to date once per refresh interval:
//!
//! 1. scan for new files and insert the users that are not cached yet,
//! 2. drop every cached user whose file no longer exists,
//! 3. sleep for the refresh interval and start over.
//!
//! Lookups take a shared lock and may run concurrently with a refresh; each
//! insert or removal takes the exclusive lock for that single key, so readers
//! see either the whole entry or no entry.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::PwdFile;
use crate::error::{Error, Result};
use crate::paths;

/// Default time between two refresh cycles.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Concurrency-safe mapping from user name to password hash.
#[derive(Debug)]
pub struct CredentialStore {
    clients_dir: PathBuf,
    hashes: RwLock<HashMap<String, Vec<u8>>>,
}

impl CredentialStore {
    /// Creates a store backed by `clients_dir` and starts its refresh task.
    ///
    /// The first refresh runs on the spawned task right away, so lookups made
    /// immediately after construction may still miss. The task ends once the
    /// last `Arc` to the store is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(clients_dir: impl Into<PathBuf>, refresh_interval: Duration) -> Arc<Self> {
        let store = Arc::new(Self::unrefreshed(clients_dir));
        tokio::spawn(refresh_forever(Arc::downgrade(&store), refresh_interval));
        store
    }

    /// Creates a store without a background task. [`CredentialStore::refresh`]
    /// must be called to populate it.
    pub fn unrefreshed(clients_dir: impl Into<PathBuf>) -> Self {
        Self { clients_dir: clients_dir.into(), hashes: RwLock::new(HashMap::new()) }
    }

    pub fn clients_dir(&self) -> &Path {
        &self.clients_dir
    }

    /// Returns the password hash stored for `user`.
    pub fn lookup(&self, user: &str) -> Result<Vec<u8>> {
        let hashes = self.hashes.read().unwrap_or_else(PoisonError::into_inner);
        hashes.get(user).cloned().ok_or_else(|| Error::UnknownUser(user.to_owned()))
    }

    /// Returns the cached user names, sorted.
    pub fn users(&self) -> Vec<String> {
        let hashes = self.hashes.read().unwrap_or_else(PoisonError::into_inner);
        let mut users: Vec<String> = hashes.keys().cloned().collect();
        users.sort();
        users
    }

    /// Runs one refresh cycle: add new users, then remove deleted ones.
    ///
    /// Performs blocking filesystem I/O; async callers should run it through
    /// `tokio::task::spawn_blocking`.
    pub fn refresh(&self) {
        self.add_users();
        self.remove_users();
    }

    fn is_cached(&self, user: &str) -> bool {
        self.hashes.read().unwrap_or_else(PoisonError::into_inner).contains_key(user)
    }

    fn add_users(&self) {
        let entries = match fs::read_dir(&self.clients_dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Error reading credential directory {}: {}", self.clients_dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(user) = paths::user_from_pwd_file(&path) else {
                continue;
            };
            if self.is_cached(&user) {
                continue;
            }

            let pwd_file = match PwdFile::load(&path) {
                Ok(pwd_file) => pwd_file,
                Err(e) => {
                    error!("Error loading credential file for user {}: {}", user, e);
                    continue;
                }
            };

            info!("Adding user: {}", user);
            self.hashes
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(user, pwd_file.pwd_hash);
        }
    }

    fn remove_users(&self) {
        for user in self.users() {
            if paths::pwd_file_in(&self.clients_dir, &user).exists() {
                continue;
            }
            info!("Removing user: {}", user);
            self.hashes.write().unwrap_or_else(PoisonError::into_inner).remove(&user);
        }
    }
}

async fn refresh_forever(store: Weak<CredentialStore>, interval: Duration) {
    loop {
        let Some(strong) = store.upgrade() else {
            break;
        };
        // Directory scans and file reads block.
        if let Err(e) = tokio::task::spawn_blocking(move || strong.refresh()).await {
            error!("Credential refresh task failed: {}", e);
        }
        tokio::time::sleep(interval).await;
    }
    debug!("Credential store dropped, refresh task finished");
}
