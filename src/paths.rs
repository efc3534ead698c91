//! File layout of a server base directory.
//!
//! ```text
//! <base>/config.json                server configuration
//! <base>/server.key, server.crt     server identity
//! <base>/ca.crt                     certificate clients trust
//! <base>/clients/<user>.json        credential file per user
//! <base>/client-config/<user>.json  generated client configuration
//! ```
//!
//! The credential store relies on this layout: the user name is the file stem
//! of a credential file, and the presence of the file is the add/remove signal.

use std::path::{Path, PathBuf};

/// Extension of credential and client configuration files.
pub const JSON_EXTENSION: &str = "json";

/// Server configuration file (`ListenAddr`, `PublicAddr`).
pub fn server_config_path(base_dir: &Path) -> PathBuf {
    base_dir.join("config.json")
}

/// PEM private key of the server certificate.
pub fn server_key_path(base_dir: &Path) -> PathBuf {
    base_dir.join("server.key")
}

/// PEM server certificate, signed by the CA.
pub fn server_cert_path(base_dir: &Path) -> PathBuf {
    base_dir.join("server.crt")
}

/// PEM CA certificate shipped to clients as their trust anchor.
pub fn ca_cert_path(base_dir: &Path) -> PathBuf {
    base_dir.join("ca.crt")
}

/// Directory of credential files watched by the credential store.
pub fn client_pwd_dir(base_dir: &Path) -> PathBuf {
    base_dir.join("clients")
}

/// Path of the credential file for `user` inside a clients directory.
pub fn pwd_file_in(clients_dir: &Path, user: &str) -> PathBuf {
    clients_dir.join(format!("{user}.{JSON_EXTENSION}"))
}

/// Credential file for `user` in the base directory's clients directory.
pub fn client_pwd_file(base_dir: &Path, user: &str) -> PathBuf {
    pwd_file_in(&client_pwd_dir(base_dir), user)
}

/// Directory receiving generated client configurations.
pub fn client_config_dir(base_dir: &Path) -> PathBuf {
    base_dir.join("client-config")
}

/// Generated client configuration for `user`.
pub fn client_config_file(base_dir: &Path, user: &str) -> PathBuf {
    client_config_dir(base_dir).join(format!("{user}.{JSON_EXTENSION}"))
}

/// Derives a user name from a credential file path, if it has the expected extension.
pub fn user_from_pwd_file(path: &Path) -> Option<String> {
    if path.extension()? != JSON_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_owned)
}
