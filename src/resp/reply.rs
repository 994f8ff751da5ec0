//! Backend Reply type and the Reply Writer that serializes it onto the
//! client wire (spec.md §3, §4.B).

use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::errors::Error;
use crate::resp::frame::FrameError;

/// A tagged result of executing one command on one backing store.
///
/// `Error` is a protocol-level error reply from the backend, forwarded to
/// the client verbatim; it is distinct from a transport failure, which is
/// surfaced as `crate::errors::Error::Io` / `Error::Pool` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Null,
    SimpleString(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Array(Vec<Reply>),
}

impl Reply {
    /// Coerces to a bulk string, distinguishing a nil reply (sentinel
    /// `Ok(None)`) from a backend protocol error (`Err`).
    pub fn as_bulk_string(&self) -> Result<Option<Bytes>, Error> {
        match self {
            Reply::Null => Ok(None),
            Reply::Bulk(b) => Ok(Some(b.clone())),
            Reply::SimpleString(s) => Ok(Some(Bytes::from(s.clone().into_bytes()))),
            Reply::Error(e) => Err(Error::BackendProtocol(e.clone())),
            other => Err(Error::Protocol(format!(
                "expected bulk string reply, got {other:?}"
            ))),
        }
    }

    /// Coerces to an integer, used for DEL's reply count.
    pub fn as_int(&self) -> Result<i64, Error> {
        match self {
            Reply::Integer(n) => Ok(*n),
            Reply::Error(e) => Err(Error::BackendProtocol(e.clone())),
            other => Err(Error::Protocol(format!(
                "expected integer reply, got {other:?}"
            ))),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    pub fn error_text(&self) -> Option<&str> {
        match self {
            Reply::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// RESP type sigils that mark an already-serialized frame. A `Bulk` reply
/// whose bytes start with one of these is written byte-for-byte rather than
/// re-escaped, so opaque passthrough of a backend's raw reply survives
/// (spec.md §4.B).
const RAW_SIGILS: &[u8] = b"+-:$*";

/// Writes one reply frame onto `out`, matching the RESP dialect.
pub async fn write_reply<W>(out: &mut W, reply: &Reply) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    match reply {
        Reply::Null => {
            out.write_all(b"$-1\r\n").await?;
        }
        Reply::SimpleString(s) => {
            out.write_all(b"+").await?;
            out.write_all(s.as_bytes()).await?;
            out.write_all(b"\r\n").await?;
        }
        Reply::Error(s) => {
            out.write_all(b"-").await?;
            out.write_all(s.as_bytes()).await?;
            out.write_all(b"\r\n").await?;
        }
        Reply::Integer(n) => {
            out.write_all(b":").await?;
            out.write_all(n.to_string().as_bytes()).await?;
            out.write_all(b"\r\n").await?;
        }
        Reply::Bulk(b) => {
            if let Some(&first) = b.first() {
                if RAW_SIGILS.contains(&first) {
                    out.write_all(b).await?;
                    return Ok(());
                }
            }
            out.write_all(b"$").await?;
            out.write_all(b.len().to_string().as_bytes()).await?;
            out.write_all(b"\r\n").await?;
            out.write_all(b).await?;
            out.write_all(b"\r\n").await?;
        }
        Reply::Array(items) => {
            out.write_all(b"*").await?;
            out.write_all(items.len().to_string().as_bytes()).await?;
            out.write_all(b"\r\n").await?;
            for item in items {
                Box::pin(write_reply(out, item)).await?;
            }
        }
    }
    Ok(())
}

/// Writes a plain error reply built from free text, used for framing and
/// auth-gate errors that never reach the dispatcher's backend-call path.
pub async fn write_error<W>(out: &mut W, text: &str) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    write_reply(out, &Reply::Error(text.to_string())).await
}

/// Parses one Backend Reply from the front of `buf`, the inbound direction
/// used when reading a backend's response on the pool-facing side of the
/// proxy. Mirrors `frame::parse_command`'s incomplete/advance contract.
pub fn parse_reply(buf: &mut BytesMut) -> Result<Option<Reply>, FrameError> {
    let mut cursor = Cursor::new(&buf[..]);
    match check_reply(&mut cursor) {
        Ok(()) => {
            let consumed = cursor.position() as usize;
            cursor.set_position(0);
            let reply = read_reply(&mut cursor)?;
            buf.advance(consumed);
            Ok(Some(reply))
        }
        Err(FrameError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

fn check_reply(src: &mut Cursor<&[u8]>) -> Result<(), FrameError> {
    match get_u8(src)? {
        b'+' | b'-' => {
            get_line(src)?;
            Ok(())
        }
        b':' => {
            get_line(src)?;
            Ok(())
        }
        b'$' => {
            let line = get_line(src)?;
            if line == b"-1" {
                return Ok(());
            }
            let len: usize = parse_len(line)?;
            skip(src, len + 2)
        }
        b'*' => {
            let line = get_line(src)?;
            if line == b"-1" {
                return Ok(());
            }
            let len: usize = parse_len(line)?;
            for _ in 0..len {
                check_reply(src)?;
            }
            Ok(())
        }
        other => Err(FrameError::Invalid(format!(
            "invalid reply type byte '{}'",
            other as char
        ))),
    }
}

fn read_reply(src: &mut Cursor<&[u8]>) -> Result<Reply, FrameError> {
    match get_u8(src)? {
        b'+' => Ok(Reply::SimpleString(decode_line(src)?)),
        b'-' => Ok(Reply::Error(decode_line(src)?)),
        b':' => {
            let line = get_line(src)?;
            let n = std::str::from_utf8(line)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| FrameError::Invalid("invalid integer reply".to_string()))?;
            Ok(Reply::Integer(n))
        }
        b'$' => {
            let line = get_line(src)?;
            if line == b"-1" {
                return Ok(Reply::Null);
            }
            let len: usize = parse_len(line)?;
            let start = src.position() as usize;
            let data = Bytes::copy_from_slice(&src.get_ref()[start..start + len]);
            src.set_position((start + len + 2) as u64);
            Ok(Reply::Bulk(data))
        }
        b'*' => {
            let line = get_line(src)?;
            if line == b"-1" {
                return Ok(Reply::Null);
            }
            let len: usize = parse_len(line)?;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(read_reply(src)?);
            }
            Ok(Reply::Array(items))
        }
        other => Err(FrameError::Invalid(format!(
            "invalid reply type byte '{other}'"
        ))),
    }
}

fn parse_len(line: &[u8]) -> Result<usize, FrameError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| FrameError::Invalid("invalid length prefix".to_string()))
}

fn decode_line(src: &mut Cursor<&[u8]>) -> Result<String, FrameError> {
    let line = get_line(src)?;
    Ok(String::from_utf8_lossy(line).into_owned())
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, FrameError> {
    if !src.has_remaining() {
        return Err(FrameError::Incomplete);
    }
    Ok(src.get_u8())
}

fn skip(src: &mut Cursor<&[u8]>, n: usize) -> Result<(), FrameError> {
    if (src.get_ref().len() as u64) < src.position() + n as u64 {
        return Err(FrameError::Incomplete);
    }
    src.set_position(src.position() + n as u64);
    Ok(())
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], FrameError> {
    let start = src.position() as usize;
    let buf = src.get_ref();
    if buf.len() < start + 1 {
        return Err(FrameError::Incomplete);
    }
    let end = buf.len().saturating_sub(1);
    for i in start..end {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            src.set_position((i + 2) as u64);
            return Ok(&buf[start..i]);
        }
    }
    Err(FrameError::Incomplete)
}
