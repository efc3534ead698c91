//! RPC record framing as specified by the Record Marking Standard of RFC 5531.
//!
//! Each record is sent as one or more fragments. A fragment is prefixed with
//! a 4-byte big-endian header whose highest bit marks the last fragment of the
//! record and whose lower 31 bits hold the fragment length. Records larger
//! than [`MAX_RPC_RECORD_LENGTH`] are rejected before their payload is read.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::MAX_RPC_RECORD_LENGTH;
use crate::error::{Error, Result};

/// Maximum fragment size is 2^31 - 1 bytes
const MAX_FRAGMENT_SIZE: usize = (1 << 31) - 1;
const LAST_FRAGMENT: u32 = 1 << 31;

/// Reads a single record-marked fragment and appends it to `append_to`.
///
/// Returns true if this was the last fragment in the record.
async fn read_fragment<R>(socket: &mut R, append_to: &mut Vec<u8>) -> Result<bool>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header_buf = [0_u8; 4];
    socket.read_exact(&mut header_buf).await?;
    let fragment_header = u32::from_be_bytes(header_buf);
    let is_last = (fragment_header & LAST_FRAGMENT) > 0;
    let length = (fragment_header & (LAST_FRAGMENT - 1)) as usize;
    trace!("Reading fragment length:{}, last:{}", length, is_last);
    if append_to.len().saturating_add(length) > MAX_RPC_RECORD_LENGTH {
        return Err(Error::Protocol(format!(
            "RPC record length {} exceeds max {}",
            append_to.len().saturating_add(length),
            MAX_RPC_RECORD_LENGTH
        )));
    }
    let start_offset = append_to.len();
    append_to.resize(start_offset + length, 0);
    socket.read_exact(&mut append_to[start_offset..]).await?;
    Ok(is_last)
}

/// Reads fragments until a complete record has been assembled.
pub async fn read_record<R>(socket: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut record = Vec::new();
    while !read_fragment(socket, &mut record).await? {}
    Ok(record)
}

/// Writes `buf` as a record of one or more fragments and flushes the stream.
///
/// An empty buffer is sent as a single empty last fragment.
pub async fn write_record<W>(socket: &mut W, buf: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut offset = 0;
    loop {
        let fragment_size = std::cmp::min(buf.len() - offset, MAX_FRAGMENT_SIZE);
        let is_last = offset + fragment_size >= buf.len();

        let fragment_header =
            if is_last { fragment_size as u32 | LAST_FRAGMENT } else { fragment_size as u32 };
        socket.write_all(&fragment_header.to_be_bytes()).await?;

        trace!("Writing fragment length:{}, last:{}", fragment_size, is_last);
        socket.write_all(&buf[offset..offset + fragment_size]).await?;

        offset += fragment_size;
        if is_last {
            break;
        }
    }
    socket.flush().await?;
    Ok(())
}
