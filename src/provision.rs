//! Creating a server base directory and enrolling clients.

use std::fs;
use std::path::Path;

use rand::RngCore;
use tracing::info;

use crate::config::{ClientConfig, PwdFile, ServerConfig};
use crate::error::{Error, Result};
use crate::{password, paths, tls};

/// Length of the random session secret generated for each client.
pub const SESSION_SECRET_LEN: usize = 48;

/// Creates the directory layout, the server configuration and the server identity.
///
/// The certificate is issued for the host part of `public_addr`.
pub fn init_server(base_dir: &Path, listen_addr: &str, public_addr: &str) -> Result<ServerConfig> {
    info!("Creating base directory {}", base_dir.display());
    create_private_dir(base_dir)?;
    create_private_dir(&paths::client_pwd_dir(base_dir))?;
    create_private_dir(&paths::client_config_dir(base_dir))?;

    let server_config =
        ServerConfig { listen_addr: listen_addr.to_owned(), public_addr: public_addr.to_owned() };
    server_config.save(base_dir)?;

    let host = tls::host_of(public_addr);
    info!("Generating key and certificate for {}", host);
    tls::generate_key_and_cert(base_dir, host)?;
    Ok(server_config)
}

/// Enrolls `user`: writes its client configuration and its credential file.
///
/// The credential file is what makes the user known to a running server, on
/// its next credential refresh. Returns the generated client configuration.
pub fn add_client(base_dir: &Path, user: &str) -> Result<ClientConfig> {
    validate_user(user)?;
    let server_config = ServerConfig::load(base_dir)?;

    let mut pwd = vec![0_u8; SESSION_SECRET_LEN];
    rand::rngs::OsRng.fill_bytes(&mut pwd);

    let client_config = ClientConfig {
        host: server_config.public_addr,
        user: user.to_owned(),
        pwd,
        ca_cert: tls::load_ca_cert(base_dir)?,
    };
    info!("Creating client configuration for {}", user);
    client_config.save(&paths::client_config_file(base_dir, user))?;

    info!("Creating password file for {}", user);
    let pwd_file = PwdFile { pwd_hash: password::hash(&client_config.pwd)? };
    pwd_file.save(&paths::client_pwd_file(base_dir, user))?;
    Ok(client_config)
}

/// Rejects names that cannot round-trip through a credential file name.
fn validate_user(user: &str) -> Result<()> {
    let valid = !user.is_empty()
        && user.len() <= usize::from(crate::protocol::frame::MAX_IDENTITY_FIELD)
        && user != "."
        && user != ".."
        && !user.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid user name {user:?}")))
    }
}

fn create_private_dir(path: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrolls_client_with_hashed_secret() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("server");
        init_server(&base, "127.0.0.1:0", "127.0.0.1:7000").unwrap();

        let cc = add_client(&base, "alice").unwrap();
        assert_eq!(cc.host, "127.0.0.1:7000");
        assert_eq!(cc.pwd.len(), SESSION_SECRET_LEN);
        assert_eq!(ClientConfig::load(&paths::client_config_file(&base, "alice")).unwrap(), cc);

        let pf = PwdFile::load(&paths::client_pwd_file(&base, "alice")).unwrap();
        assert!(password::verify(&pf.pwd_hash, &cc.pwd).unwrap());
    }

    #[test]
    fn rejects_path_like_user_names() {
        let dir = tempfile::tempdir().unwrap();
        init_server(dir.path(), "127.0.0.1:0", "localhost:7000").unwrap();
        for user in ["", ".", "..", "a/b", "a\\b"] {
            assert!(matches!(add_client(dir.path(), user), Err(Error::Config(_))), "{user:?}");
        }
    }
}
