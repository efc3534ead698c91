//! Username/password exchange run on every connection before RPC traffic.
//!
//! ```text
//! client -> server: u16 LE length (<= 256), user name bytes
//! client -> server: u16 LE length (<= 256), password bytes
//! ```
//!
//! The server answers nothing. On success the same stream carries RPC records;
//! on failure the server closes it.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use super::frame::{read_message, write_message, MAX_IDENTITY_FIELD};
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::password;

/// Server side: reads and verifies the peer's credentials, returning its user name.
///
/// The steps are strictly ordered: user name, lookup, password, verify. An
/// unknown user fails before any password byte is read. Verification runs on
/// the blocking pool.
pub async fn authenticate<S>(stream: &mut S, store: &CredentialStore) -> Result<String>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let name = read_message(stream, MAX_IDENTITY_FIELD).await?;
    let user = String::from_utf8(name)
        .map_err(|_| Error::Protocol("user name is not valid UTF-8".into()))?;

    let hash = store.lookup(&user)?;

    let pwd = read_message(stream, MAX_IDENTITY_FIELD).await?;
    let verified = tokio::task::spawn_blocking(move || password::verify(&hash, &pwd))
        .await
        .map_err(|e| Error::Hash(format!("password verification task failed: {e}")))??;
    if !verified {
        return Err(Error::AuthFailed(user));
    }
    Ok(user)
}

/// Client side: sends the user name, then the password.
pub async fn present_credentials<S>(stream: &mut S, user: &str, pwd: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    write_message(stream, user.as_bytes()).await?;
    write_message(stream, pwd).await?;
    stream.flush().await?;
    Ok(())
}
