//! JSON configuration files for the server, its clients and per-user credentials.
//!
//! Field names are PascalCase on disk and byte fields are base64 strings.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths;

/// Server settings stored in `<base>/config.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub listen_addr: String,
    /// Address clients use to reach the server.
    pub public_addr: String,
}

impl ServerConfig {
    pub fn load(base_dir: &Path) -> Result<Self> {
        load_json(&paths::server_config_path(base_dir))
    }

    pub fn save(&self, base_dir: &Path) -> Result<()> {
        save_json(&paths::server_config_path(base_dir), self)
    }
}

/// Everything a client needs to dial, trust the server and authenticate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientConfig {
    /// Server address as `host:port`.
    pub host: String,
    /// User name presented during the handshake.
    pub user: String,
    /// Session secret presented during the handshake.
    #[serde(with = "base64_bytes")]
    pub pwd: Vec<u8>,
    /// PEM encoded certificate the server chain must lead to.
    #[serde(with = "base64_bytes")]
    pub ca_cert: Vec<u8>,
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(path, self)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Server-side credential for one user, stored in `<base>/clients/<user>.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PwdFile {
    #[serde(with = "base64_bytes")]
    pub pwd_hash: Vec<u8>,
}

impl PwdFile {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(path, self)
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path)?;
    serde_json::from_slice(&data)
        .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    write_private(path, &data)
}

/// Writes `data` to `path`, readable by the owner only on unix.
pub(crate) fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}
