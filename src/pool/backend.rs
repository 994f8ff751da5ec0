//! Dialing and recycling of pooled backend connections.
//!
//! Grounded on `pool::inner::Manager`: one `BackendManager` per backend
//! (source or destination), responsible only for opening a fresh TCP
//! connection (optionally AUTHing) and giving the pool a cheap way to
//! decide whether an idle connection is still worth handing out.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::errors::RecycleResult;
use super::types::Metrics;
use crate::config::BackendConfig;
use crate::resp::{encode_command, parse_reply, Reply};

/// One TCP connection to a backing store, with its own read buffer.
pub struct BackendConnection {
    stream: TcpStream,
    buffer: BytesMut,
    /// Set once a command on this connection fails transport-side (broken
    /// socket, EOF mid-reply, unparseable reply). We'll remove it from the
    /// pool on the next recycle rather than hand a dead socket back out.
    bad: bool,
}

impl BackendConnection {
    /// Sends one command and waits for its single reply. Any `Err` here
    /// marks the connection bad: the caller still observes the error, but
    /// the socket is never handed out again (spec.md §7.2).
    pub async fn do_cmd(&mut self, parts: &[&[u8]]) -> std::io::Result<Reply> {
        match self.do_cmd_inner(parts).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                self.mark_bad(&e.to_string());
                Err(e)
            }
        }
    }

    async fn do_cmd_inner(&mut self, parts: &[&[u8]]) -> std::io::Result<Reply> {
        let encoded = encode_command(parts);
        self.stream.write_all(&encoded).await?;

        loop {
            if let Some(reply) = parse_reply(&mut self.buffer)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?
            {
                return Ok(reply);
            }
            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "backend closed connection mid-reply",
                ));
            }
        }
    }

    /// Indicate that this connection cannot be re-used and must be discarded.
    fn mark_bad(&mut self, reason: &str) {
        log::warn!("backend connection marked bad, reason: {reason}");
        self.bad = true;
    }

    fn is_bad(&self) -> bool {
        self.bad
    }
}

/// Dials and recycles connections to one backend address.
pub struct BackendManager {
    config: BackendConfig,
}

impl BackendManager {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }
}

impl super::inner::Manager for BackendManager {
    type Type = BackendConnection;

    async fn create(&self) -> Result<BackendConnection, std::io::Error> {
        let stream = TcpStream::connect(&self.config.addr).await?;
        stream.set_nodelay(true)?;
        let mut conn = BackendConnection {
            stream,
            buffer: BytesMut::with_capacity(4 * 1024),
            bad: false,
        };

        if !self.config.password.is_empty() {
            let reply = conn
                .do_cmd(&[b"AUTH", self.config.password.as_bytes()])
                .await?;
            if reply.is_error() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!(
                        "AUTH to {} failed: {}",
                        self.config.addr,
                        reply.error_text().unwrap_or("unknown error")
                    ),
                ));
            }
        }

        Ok(conn)
    }

    /// The facade does not guarantee connection health beyond what the pool
    /// provides (spec.md §4.A). A connection that faulted mid-command is
    /// never handed back out (spec.md §7.2); otherwise the only check is the
    /// configured idle-timeout, past which a connection is dropped instead
    /// of reused.
    async fn recycle(&self, obj: &mut BackendConnection, metrics: &Metrics) -> RecycleResult {
        if obj.is_bad() {
            return Err(super::errors::RecycleError::Message(format!(
                "connection to {} is bad, discarding",
                self.config.addr
            )));
        }
        if metrics.last_used() > self.config.idle_timeout.into() {
            return Err(super::errors::RecycleError::Message(format!(
                "connection to {} idle for {:?}, past idle_timeout",
                self.config.addr,
                metrics.last_used()
            )));
        }
        Ok(())
    }
}
