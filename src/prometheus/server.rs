//! HTTP server for the `/health` and `/metrics` endpoints.
//!
//! Grounded on the teacher's `prometheus/server.rs`: raw `TcpSocket` bind,
//! manual request-line parsing, manual `HTTP/1.1` response writing. Unlike
//! the teacher this multiplexes two routes instead of always serving
//! metrics, and drops gzip negotiation (bodies here are small).

use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::broadcast;

use crate::client::ProxyState;
use crate::errors::Error;
use crate::health;

/// Binds `host:port` and serves `/health` and `/metrics` until `shutdown`
/// fires.
pub async fn start_instrumentation_server(
    host: &str,
    port: u16,
    state: Arc<ProxyState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), Error> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| Error::Config(format!("invalid instrumentation address {host}:{port}: {e}")))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;
    info!("instrumentation server listening on {addr}");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!("instrumentation accept error: {e}");
                        continue;
                    }
                };
                let state = state.clone();
                tokio::spawn(async move {
                    handle_request(stream, &state).await;
                });
            }
            _ = shutdown.recv() => {
                info!("instrumentation server shutting down");
                return Ok(());
            }
        }
    }
}

async fn handle_request(stream: TcpStream, state: &ProxyState) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);

    let mut header_buf = [0u8; 1024];
    let n = match reader.read(&mut header_buf).await {
        Ok(n) => n,
        Err(e) => {
            error!("instrumentation: failed to read request: {e}");
            return;
        }
    };
    let request = String::from_utf8_lossy(&header_buf[..n]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let (status, content_type, body) = match path {
        "/metrics" => match crate::metrics::gather_text() {
            Ok(body) => (200, crate::metrics::content_type(), body),
            Err(e) => {
                error!("instrumentation: failed to encode metrics: {e}");
                (500, "text/plain", format!("encode error: {e}").into_bytes())
            }
        },
        "/health" => {
            let report = health::probe(state).await;
            let status = report.http_status();
            let body = serde_json::to_vec(&report).unwrap_or_else(|_| b"{}".to_vec());
            (status, "application/json", body)
        }
        _ => (404, "text/plain", b"not found".to_vec()),
    };

    if let Err(e) = write_response(&mut writer, status, content_type, &body).await {
        error!("instrumentation: failed to write response: {e}");
    }
}

async fn write_response<W>(
    out: &mut W,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    out.write_all(response.as_bytes()).await?;
    out.write_all(body).await?;
    out.flush().await
}
