//! Listener / Accept Loop (spec.md §4.G): binds the client-facing TCP
//! socket and spawns one logical worker per accepted connection.

use std::sync::Arc;

use log::{error, info};
use socket2::SockRef;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::broadcast;

use crate::errors::Error;

use super::core::Client;
use super::state::ProxyState;

/// Binds `host:port` and serves connections until `shutdown` fires. Each
/// accepted connection is handed to its own tokio task; there is no shared
/// state between connections other than what's reachable via `state`
/// (spec.md §4.G).
pub async fn run_accept_loop(
    host: &str,
    port: u16,
    state: Arc<ProxyState>,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), Error> {
    let listener = bind(host, port)?;
    info!("listening on {host}:{port}");
    serve(listener, state, shutdown).await
}

/// Drives the accept loop over an already-bound listener until `shutdown`
/// fires. Split out from [`run_accept_loop`] so callers that need the
/// kernel-assigned port (e.g. binding to port 0 in tests) can bind first,
/// read `TcpListener::local_addr`, and hand the listener in here.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ProxyState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), Error> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };
                info!("client {addr} connected");
                let state = state.clone();
                tokio::spawn(async move {
                    Client::new(stream, addr, state).run().await;
                });
            }
            _ = shutdown.recv() => {
                info!("accept loop shutting down");
                return Ok(());
            }
        }
    }
}

/// Binds a ready-to-listen socket at `host:port` (use port 0 to let the
/// kernel assign one, then read it back via [`TcpListener::local_addr`]).
pub fn bind(host: &str, port: u16) -> Result<TcpListener, Error> {
    let addr = format!("{host}:{port}")
        .parse()
        .map_err(|e| Error::Config(format!("invalid listen address {host}:{port}: {e}")))?;

    let socket = if matches!(addr, std::net::SocketAddr::V4(_)) {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.set_nodelay(true)?;
    SockRef::from(&socket)
        .set_linger(Some(std::time::Duration::from_secs(0)))
        .map_err(Error::Io)?;
    socket.bind(addr)?;
    Ok(socket.listen(1024)?)
}
