//! Inbound command framing: parses a RESP array-of-bulk-strings frame (the
//! only shape a real client ever sends as a command) out of a byte buffer.
//!
//! Grounded on the mini-redis `Frame::check`/`parse` split: `check` walks the
//! buffer without allocating to tell the caller whether a full frame is
//! present yet, `parse` then does the real decode once `check` succeeds.

use bytes::{Buf, Bytes, BytesMut};
use std::fmt;
use std::io::Cursor;

/// One inbound command: the first element is the command name, the rest are
/// arguments. Arity is not fixed by the frame itself (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub parts: Vec<Bytes>,
}

impl CommandFrame {
    pub fn name(&self) -> Option<&[u8]> {
        self.parts.first().map(|b| b.as_ref())
    }

    pub fn arity(&self) -> usize {
        self.parts.len()
    }

    pub fn arg(&self, i: usize) -> Option<&Bytes> {
        self.parts.get(i)
    }
}

#[derive(Debug)]
pub enum FrameError {
    /// Not enough bytes buffered yet; the caller should read more.
    Incomplete,
    /// The bytes present are not a valid frame and never will be.
    Invalid(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Incomplete => write!(f, "incomplete frame"),
            FrameError::Invalid(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Tries to parse one command frame from the front of `buf`. On success,
/// the consumed bytes are advanced out of `buf`. Returns `Incomplete` if
/// more bytes are needed; the buffer is left untouched in that case.
pub fn parse_command(buf: &mut BytesMut) -> Result<Option<CommandFrame>, FrameError> {
    let mut cursor = Cursor::new(&buf[..]);

    match check(&mut cursor) {
        Ok(len) => {
            cursor.set_position(0);
            let frame = read_command(&mut cursor)?;
            buf.advance(len);
            Ok(Some(frame))
        }
        Err(FrameError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Walks the buffer verifying a complete array-of-bulk-strings frame is
/// present, returning the number of bytes it occupies.
fn check(src: &mut Cursor<&[u8]>) -> Result<usize, FrameError> {
    match get_u8(src)? {
        b'*' => {
            let len = get_decimal(src)?;
            for _ in 0..len {
                match get_u8(src)? {
                    b'$' => {
                        let bulk_len = get_decimal(src)?;
                        skip(src, bulk_len as usize + 2)?;
                    }
                    other => {
                        return Err(FrameError::Invalid(format!(
                            "expected bulk string in command array, got '{}'",
                            other as char
                        )))
                    }
                }
            }
            Ok(src.position() as usize)
        }
        // Inline commands are not part of this proxy's wire contract; every
        // real client frames commands as RESP arrays.
        other => Err(FrameError::Invalid(format!(
            "expected '*', got '{}'",
            other as char
        ))),
    }
}

fn read_command(src: &mut Cursor<&[u8]>) -> Result<CommandFrame, FrameError> {
    match get_u8(src)? {
        b'*' => {
            let len = get_decimal(src)?;
            let mut parts = Vec::with_capacity(len as usize);
            for _ in 0..len {
                match get_u8(src)? {
                    b'$' => {
                        let bulk_len = get_decimal(src)? as usize;
                        let start = src.position() as usize;
                        let data = Bytes::copy_from_slice(&src.get_ref()[start..start + bulk_len]);
                        src.set_position((start + bulk_len + 2) as u64);
                        parts.push(data);
                    }
                    other => {
                        return Err(FrameError::Invalid(format!(
                            "expected bulk string, got '{}'",
                            other as char
                        )))
                    }
                }
            }
            Ok(CommandFrame { parts })
        }
        other => Err(FrameError::Invalid(format!("expected '*', got '{other}'"))),
    }
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, FrameError> {
    if !src.has_remaining() {
        return Err(FrameError::Incomplete);
    }
    Ok(src.get_u8())
}

fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<u64, FrameError> {
    let line = get_line(src)?;
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| FrameError::Invalid("invalid length prefix".to_string()))
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

/// Encodes a command (name plus arguments) as a RESP array of bulk strings,
/// the shape every backend command this proxy issues takes.
pub fn encode_command(parts: &[&[u8]]) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(format!("*{}\r\n", parts.len()).as_bytes());
    for part in parts {
        buf.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        buf.extend_from_slice(part);
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(parts: &[&str]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(format!("*{}\r\n", parts.len()).as_bytes());
        for p in parts {
            buf.extend_from_slice(format!("${}\r\n", p.len()).as_bytes());
            buf.extend_from_slice(p.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf
    }

    #[test]
    fn parses_get_command() {
        let mut buf = encode(&["GET", "mykey"]);
        let frame = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(frame.arity(), 2);
        assert_eq!(frame.name(), Some(b"GET".as_slice()));
        assert_eq!(frame.arg(1).unwrap().as_ref(), b"mykey");
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_frame_returns_none_and_preserves_buffer() {
        let full = encode(&["GET", "mykey"]);
        let mut partial = BytesMut::from(&full[..full.len() - 3]);
        let before = partial.clone();
        let result = parse_command(&mut partial).unwrap();
        assert!(result.is_none());
        assert_eq!(partial, before);
    }

    #[test]
    fn two_pipelined_frames_parse_in_order() {
        let mut buf = encode(&["PING"]);
        buf.extend_from_slice(&encode(&["PING"]));
        let first = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(first.name(), Some(b"PING".as_slice()));
        let second = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(second.name(), Some(b"PING".as_slice()));
        assert!(buf.is_empty());
    }

    #[test]
    fn non_array_frame_is_invalid() {
        let mut buf = BytesMut::from(&b"+PING\r\n"[..]);
        let err = parse_command(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::Invalid(_)));
    }
}
