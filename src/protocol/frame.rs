//! Length-prefixed framing used by the authentication handshake.
//!
//! Each message is a 2-byte little-endian unsigned length followed by exactly
//! that many payload bytes. The reader supplies an upper bound so that a peer
//! cannot make the server allocate more than a handful of bytes per field.

use byteorder::{ByteOrder, LittleEndian};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{Error, Result};

/// Upper bound for the user name and password fields of the handshake.
pub const MAX_IDENTITY_FIELD: u16 = 256;

/// Size of the length prefix.
const HEADER_LEN: usize = 2;

/// Writes `payload` prefixed with its length.
///
/// Fails with [`Error::Protocol`] if the payload does not fit in a `u16`
/// length, or with [`Error::Transport`] if the write fails.
pub async fn write_message<W>(stream: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let length = u16::try_from(payload.len()).map_err(|_| {
        Error::Protocol(format!("message of {} bytes exceeds {}", payload.len(), u16::MAX))
    })?;

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.resize(HEADER_LEN, 0);
    LittleEndian::write_u16(&mut buf[..HEADER_LEN], length);
    buf.extend_from_slice(payload);

    trace!("Writing handshake message length:{}", length);
    stream.write_all(&buf).await?;
    Ok(())
}

/// Reads one length-prefixed message of at most `limit` bytes.
///
/// The declared length is checked against `limit` before any payload byte is
/// consumed. A stream that closes early yields [`Error::Transport`].
pub async fn read_message<R>(stream: &mut R, limit: u16) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0_u8; HEADER_LEN];
    stream.read_exact(&mut header).await?;
    let length = LittleEndian::read_u16(&header);
    if length > limit {
        return Err(Error::Protocol(format!("message length {length} exceeds limit {limit}")));
    }

    trace!("Reading handshake message length:{}", length);
    let mut payload = vec![0_u8; usize::from(length)];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}
