//! Envelope of the records exchanged after the handshake.
//!
//! All integers are big-endian.
//!
//! ```text
//! call:  u32 msg_type = 0 | u64 seq | u32 len, method | u32 len, body
//! reply: u32 msg_type = 1 | u64 seq | u32 status | u32 len, body or error text
//! ```

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum MessageType {
    Call = 0,
    Reply = 1,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ReplyStatus {
    Success = 0,
    Error = 1,
}

/// Request for `method` with JSON encoded arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub seq: u64,
    /// `"Service.Method"`
    pub method: String,
    pub body: Vec<u8>,
}

/// Answer to the call with the same `seq`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub seq: u64,
    /// JSON encoded reply, or the error text produced by the service.
    pub result: std::result::Result<Vec<u8>, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Call(Call),
    Reply(Reply),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Call(_) => MessageType::Call,
            Message::Reply(_) => MessageType::Reply,
        }
    }

    /// Encodes the message into a fresh buffer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        // ToPrimitive on a fieldless repr(u32) enum cannot fail.
        buf.write_u32::<BigEndian>(self.message_type().to_u32().unwrap_or_default())?;
        match self {
            Message::Call(call) => {
                buf.write_u64::<BigEndian>(call.seq)?;
                write_opaque(&mut buf, call.method.as_bytes())?;
                write_opaque(&mut buf, &call.body)?;
            }
            Message::Reply(reply) => {
                buf.write_u64::<BigEndian>(reply.seq)?;
                let (status, body) = match &reply.result {
                    Ok(body) => (ReplyStatus::Success, body.as_slice()),
                    Err(text) => (ReplyStatus::Error, text.as_bytes()),
                };
                buf.write_u32::<BigEndian>(status.to_u32().unwrap_or_default())?;
                write_opaque(&mut buf, body)?;
            }
        }
        Ok(buf)
    }

    /// Decodes a complete record.
    pub fn decode(record: &[u8]) -> Result<Message> {
        let mut src = Cursor::new(record);
        let raw_type = src.read_u32::<BigEndian>().map_err(truncated)?;
        let message = match MessageType::from_u32(raw_type) {
            Some(MessageType::Call) => {
                let seq = src.read_u64::<BigEndian>().map_err(truncated)?;
                let method = String::from_utf8(read_opaque(&mut src)?)
                    .map_err(|_| Error::Protocol("method name is not valid UTF-8".into()))?;
                let body = read_opaque(&mut src)?;
                Message::Call(Call { seq, method, body })
            }
            Some(MessageType::Reply) => {
                let seq = src.read_u64::<BigEndian>().map_err(truncated)?;
                let raw_status = src.read_u32::<BigEndian>().map_err(truncated)?;
                let body = read_opaque(&mut src)?;
                let result = match ReplyStatus::from_u32(raw_status) {
                    Some(ReplyStatus::Success) => Ok(body),
                    Some(ReplyStatus::Error) => Err(String::from_utf8_lossy(&body).into_owned()),
                    None => {
                        return Err(Error::Protocol(format!("unknown reply status {raw_status}")))
                    }
                };
                Message::Reply(Reply { seq, result })
            }
            None => return Err(Error::Protocol(format!("unknown message type {raw_type}"))),
        };

        if (src.position() as usize) != record.len() {
            return Err(Error::Protocol("trailing bytes after message".into()));
        }
        Ok(message)
    }
}

fn write_opaque(dest: &mut impl Write, data: &[u8]) -> Result<()> {
    let length = u32::try_from(data.len())
        .map_err(|_| Error::Protocol(format!("field of {} bytes is too long", data.len())))?;
    dest.write_u32::<BigEndian>(length)?;
    dest.write_all(data)?;
    Ok(())
}

fn read_opaque(src: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let length = src.read_u32::<BigEndian>().map_err(truncated)? as usize;
    let remaining = src.get_ref().len() - src.position() as usize;
    if length > remaining {
        return Err(Error::Protocol(format!("field length {length} exceeds record")));
    }
    let mut data = vec![0_u8; length];
    src.read_exact(&mut data).map_err(truncated)?;
    Ok(data)
}

fn truncated(_: std::io::Error) -> Error {
    Error::Protocol("truncated message".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_encoded_call_and_reply() {
        let call = Message::Call(Call { seq: 9, method: "Echo.Say".into(), body: b"\"hi\"".to_vec() });
        assert_eq!(Message::decode(&call.encode().unwrap()).unwrap(), call);

        let reply = Message::Reply(Reply { seq: 9, result: Err("boom".into()) });
        assert_eq!(Message::decode(&reply.encode().unwrap()).unwrap(), reply);
    }

    #[test]
    fn rejects_unknown_type_and_truncation() {
        let err = Message::decode(&7_u32.to_be_bytes()).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));

        let call = Message::Call(Call { seq: 1, method: "A.B".into(), body: vec![1, 2, 3] });
        let encoded = call.encode().unwrap();
        let err = Message::decode(&encoded[..encoded.len() - 1]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn rejects_oversized_field_length() {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(0).unwrap();
        buf.write_u64::<BigEndian>(1).unwrap();
        buf.write_u32::<BigEndian>(u32::MAX).unwrap();
        assert!(matches!(Message::decode(&buf), Err(Error::Protocol(_))));
    }
}
