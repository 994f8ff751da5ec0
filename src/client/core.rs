//! Per-connection read-dispatch-write loop (spec.md §4.G).

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::net::TcpStream;

use crate::errors::Error;
use crate::resp::Connection;

use super::dispatch::dispatch;
use super::state::ProxyState;

pub struct Client {
    conn: Connection,
    addr: SocketAddr,
    state: Arc<ProxyState>,
}

impl Client {
    pub fn new(stream: TcpStream, addr: SocketAddr, state: Arc<ProxyState>) -> Self {
        Self {
            conn: Connection::new(stream),
            addr,
            state,
        }
    }

    /// Drives the read-dispatch-write loop until the client disconnects,
    /// issues QUIT, or a framing error corrupts the stream (spec.md §7.1).
    /// Always clears the Auth Table entry on the way out.
    pub async fn run(mut self) {
        let result = self.serve().await;
        self.state.auth.clear(self.addr);
        match result {
            Ok(()) => debug!("client {} disconnected", self.addr),
            Err(e) => warn!("client {} disconnected: {e}", self.addr),
        }
    }

    async fn serve(&mut self) -> Result<(), Error> {
        loop {
            let frame = match self.conn.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e) => {
                    // A framing error corrupts the stream; there is no
                    // reliable resync point, so the connection is closed
                    // after telling the client why (spec.md §7.1).
                    let _ = self.conn.write_error(&format!("ERR {e}")).await;
                    let _ = self.conn.flush().await;
                    return Err(e);
                }
            };

            let outcome = dispatch(&self.state, self.addr, &frame).await;
            self.conn.write_reply(&outcome.reply).await?;
            self.conn.flush().await?;

            if outcome.close {
                info!("client {} issued QUIT", self.addr);
                return Ok(());
            }
        }
    }
}
