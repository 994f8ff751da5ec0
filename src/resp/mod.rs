//! RESP wire handling: command framing, the Backend Reply type, and the
//! buffered connection both sides of the proxy use to exchange frames.
//!
//! Grounded on the mini-redis `Connection` type: a `BufWriter` around the
//! socket plus a growable `BytesMut` read buffer, filled until a full frame
//! parses out of it.

pub mod frame;
pub mod reply;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

pub use frame::{encode_command, CommandFrame, FrameError};
pub use reply::{parse_reply, write_error, write_reply, Reply};

use crate::errors::Error;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// A client-facing connection: reads inbound command frames and writes
/// outbound reply frames over the same TCP stream.
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Reads one command frame, buffering more bytes from the socket as
    /// needed. Returns `Ok(None)` on a clean EOF with no partial frame
    /// pending (the connection closed between commands).
    pub async fn read_frame(&mut self) -> Result<Option<CommandFrame>, Error> {
        loop {
            if let Some(frame) = frame::parse_command(&mut self.buffer).map_err(frame_error)? {
                return Ok(Some(frame));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(Error::Protocol(
                    "connection reset mid-frame".to_string(),
                ));
            }
        }
    }

    pub async fn write_reply(&mut self, reply: &Reply) -> Result<(), Error> {
        write_reply(&mut self.stream, reply).await
    }

    pub async fn write_error(&mut self, text: &str) -> Result<(), Error> {
        write_error(&mut self.stream, text).await
    }

    pub async fn flush(&mut self) -> Result<(), Error> {
        self.stream.flush().await?;
        Ok(())
    }
}

fn frame_error(e: FrameError) -> Error {
    match e {
        FrameError::Incomplete => Error::Protocol("incomplete frame".to_string()),
        FrameError::Invalid(msg) => Error::Protocol(msg),
    }
}
