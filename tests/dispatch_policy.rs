//! End-to-end tests of the migration policy engine (spec.md §8): a real
//! client connects over TCP to a real accept loop, and two fake backend
//! TCP servers play the role of source/destination, scripted to return
//! canned replies and recording which commands they actually received.
//!
//! These exercise the dispatcher as a black box through the wire protocol
//! rather than calling its (crate-private) internals directly, the same
//! way a client library would.

use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use remiro::client::{bind, serve, ProxyState};
use remiro::config::{BackendConfig, Config};
use remiro::resp::frame::{encode_command, parse_command};
use remiro::resp::{parse_reply, Reply};

/// A scripted fake backend: for each `(expected command name, raw reply
/// bytes)` pair, accepts one connection (on the first call) and serves
/// each exchange in order, recording the command names it actually saw.
struct FakeBackend {
    addr: std::net::SocketAddr,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeBackend {
    async fn spawn(script: Vec<(&'static str, &'static [u8])>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_task = calls.clone();

        tokio::spawn(async move {
            if script.is_empty() {
                // Never expected to be dialed; just hold the listener open
                // so a connection attempt (which would be a bug) doesn't
                // get an immediate connection-refused.
                let _ = listener.accept().await;
                return;
            }

            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = BytesMut::with_capacity(4096);

            for (expected_name, reply) in script {
                let frame = loop {
                    if let Some(frame) = parse_command(&mut buf).unwrap() {
                        break frame;
                    }
                    let n = stream.read_buf(&mut buf).await.unwrap();
                    assert_ne!(n, 0, "backend connection closed mid-command");
                };
                let name = String::from_utf8_lossy(frame.name().unwrap()).to_uppercase();
                assert_eq!(name, expected_name, "unexpected command reached this backend");
                calls_task.lock().unwrap().push(name);
                stream.write_all(reply).await.unwrap();
            }
        });

        Self { addr, calls }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn backend_config(fb: &FakeBackend) -> BackendConfig {
    BackendConfig {
        addr: fb.addr.to_string(),
        password: String::new(),
        max_idle_conns: 4,
        idle_timeout: remiro::Duration::from_secs(60),
    }
}

struct Harness {
    client: TcpStream,
    source: FakeBackend,
    destination: FakeBackend,
    _shutdown: broadcast::Sender<()>,
}

impl Harness {
    async fn start(
        password: &str,
        delete_on_get: bool,
        delete_on_set: bool,
        source_script: Vec<(&'static str, &'static [u8])>,
        destination_script: Vec<(&'static str, &'static [u8])>,
    ) -> Self {
        let source = FakeBackend::spawn(source_script).await;
        let destination = FakeBackend::spawn(destination_script).await;

        let config = Config {
            password: password.to_string(),
            delete_on_get,
            delete_on_set,
            source: backend_config(&source),
            destination: backend_config(&destination),
            path: String::new(),
        };

        let state = ProxyState::new(&config);
        let listener = bind("127.0.0.1", 0).unwrap();
        let proxy_addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(serve(listener, state, shutdown_rx));

        let client = TcpStream::connect(proxy_addr).await.unwrap();
        Self {
            client,
            source,
            destination,
            _shutdown: shutdown_tx,
        }
    }

    async fn send(&mut self, parts: &[&[u8]]) {
        let encoded = encode_command(parts);
        self.client.write_all(&encoded).await.unwrap();
    }

    async fn recv_reply(&mut self) -> Reply {
        let mut buf = BytesMut::with_capacity(4096);
        loop {
            if let Some(reply) = parse_reply(&mut buf).unwrap() {
                return reply;
            }
            let n = self.client.read_buf(&mut buf).await.unwrap();
            assert_ne!(n, 0, "proxy closed connection without a reply");
        }
    }
}

/// Scenario 1: GET hit on destination. No source calls at all (P4).
#[tokio::test]
async fn get_hit_on_destination_skips_source() {
    let mut h = Harness::start(
        "",
        true,
        false,
        vec![],
        vec![("GET", b"$5\r\nhello\r\n")],
    )
    .await;

    h.send(&[b"GET", b"mykey"]).await;
    let reply = h.recv_reply().await;
    assert_eq!(reply, Reply::Bulk(bytes::Bytes::from_static(b"hello")));
    assert_eq!(h.source.call_count(), 0);
    assert_eq!(h.destination.call_count(), 1);
}

/// Scenario 2: GET miss on destination falls back to source, then promotes
/// the value into destination and (delete_on_get) invalidates source.
#[tokio::test]
async fn get_miss_promotes_and_invalidates() {
    let mut h = Harness::start(
        "",
        true,
        false,
        vec![("GET", b"$5\r\nhello\r\n"), ("DEL", b":1\r\n")],
        vec![("GET", b"$-1\r\n"), ("SET", b"+OK\r\n")],
    )
    .await;

    h.send(&[b"GET", b"mykey"]).await;
    let reply = h.recv_reply().await;
    assert_eq!(reply, Reply::Bulk(bytes::Bytes::from_static(b"hello")));
    assert_eq!(h.destination.call_count(), 2);
    assert_eq!(h.source.call_count(), 2);
}

/// Scenario 3: GET miss on both backends returns a null bulk reply.
#[tokio::test]
async fn get_miss_on_both_returns_null() {
    let mut h = Harness::start(
        "",
        false,
        false,
        vec![("GET", b"$-1\r\n")],
        vec![("GET", b"$-1\r\n")],
    )
    .await;

    h.send(&[b"GET", b"mykey"]).await;
    assert_eq!(h.recv_reply().await, Reply::Null);
}

/// Scenario 4: SET with invalidation enabled invalidates source the first
/// time a key is seen.
#[tokio::test]
async fn set_with_invalidation_first_time() {
    let mut h = Harness::start(
        "",
        false,
        true,
        vec![("DEL", b":1\r\n")],
        vec![("SET", b"+OK\r\n")],
    )
    .await;

    h.send(&[b"SET", b"mykey", b"hello"]).await;
    assert_eq!(
        h.recv_reply().await,
        Reply::SimpleString("OK".to_string())
    );
    assert_eq!(h.source.call_count(), 1);
}

/// Scenario 5 / P6: once a key is memoized, a second SET does not re-issue
/// the source DEL.
#[tokio::test]
async fn set_skips_del_once_key_is_memoized() {
    let mut h = Harness::start(
        "",
        false,
        true,
        vec![("DEL", b":1\r\n")],
        vec![("SET", b"+OK\r\n"), ("SET", b"+OK\r\n")],
    )
    .await;

    h.send(&[b"SET", b"mykey", b"hello"]).await;
    assert_eq!(h.recv_reply().await, Reply::SimpleString("OK".to_string()));
    assert_eq!(h.source.call_count(), 1);

    h.send(&[b"SET", b"mykey", b"world"]).await;
    assert_eq!(h.recv_reply().await, Reply::SimpleString("OK".to_string()));
    // No second DEL: the fake source server's script only had one entry,
    // so a second DEL would have failed the `assert_eq!(name, expected)`
    // inside the spawned task; reaching here with call_count unchanged
    // confirms P6.
    assert_eq!(h.source.call_count(), 1);
}

/// P5: when `delete_on_set` is false, SET never touches source at all.
#[tokio::test]
async fn set_without_invalidation_never_calls_source() {
    let mut h = Harness::start("", false, false, vec![], vec![("SET", b"+OK\r\n")]).await;

    h.send(&[b"SET", b"mykey", b"hello"]).await;
    assert_eq!(h.recv_reply().await, Reply::SimpleString("OK".to_string()));
    assert_eq!(h.source.call_count(), 0);
}

/// Scenario 6: a wrong AUTH is rejected with the byte-exact error text, and
/// the connection then stays unauthenticated for subsequent commands.
#[tokio::test]
async fn auth_failure_then_noauth_gate() {
    let mut h = Harness::start("justapass", false, false, vec![], vec![]).await;

    h.send(&[b"AUTH", b"wrongpass"]).await;
    assert_eq!(
        h.recv_reply().await,
        Reply::Error("ERR invalid password".to_string())
    );

    h.send(&[b"PING"]).await;
    assert_eq!(
        h.recv_reply().await,
        Reply::Error("NOAUTH Authentication required.".to_string())
    );
    // P3: zero backend calls on a rejected command.
    assert_eq!(h.destination.call_count(), 0);
    assert_eq!(h.source.call_count(), 0);
}

/// Successful AUTH unlocks the connection; PING then works without ever
/// touching a backend.
#[tokio::test]
async fn auth_success_unlocks_ping() {
    let mut h = Harness::start("justapass", false, false, vec![], vec![]).await;

    h.send(&[b"AUTH", b"justapass"]).await;
    assert_eq!(h.recv_reply().await, Reply::SimpleString("OK".to_string()));

    h.send(&[b"PING"]).await;
    assert_eq!(h.recv_reply().await, Reply::SimpleString("PONG".to_string()));
}

/// P2: with no password configured, NOAUTH is never emitted, even for a
/// backend-touching command.
#[tokio::test]
async fn no_password_never_gates() {
    let mut h = Harness::start("", false, false, vec![], vec![("SET", b"+OK\r\n")]).await;

    h.send(&[b"SET", b"mykey", b"hello"]).await;
    let reply = h.recv_reply().await;
    assert_ne!(
        reply,
        Reply::Error("NOAUTH Authentication required.".to_string())
    );
    assert_eq!(reply, Reply::SimpleString("OK".to_string()));
}

/// Scenario 7: any other command forwards verbatim to destination only.
#[tokio::test]
async fn default_command_passes_through_to_destination() {
    let mut h = Harness::start("", false, false, vec![], vec![("ECHO", b"+Hello\r\n")]).await;

    h.send(&[b"ECHO", b"Hello"]).await;
    assert_eq!(h.recv_reply().await, Reply::SimpleString("Hello".to_string()));
    assert_eq!(h.source.call_count(), 0);
}

/// QUIT replies OK and then the connection is closed by the proxy (P1).
#[tokio::test]
async fn quit_replies_then_closes() {
    let mut h = Harness::start("", false, false, vec![], vec![]).await;

    h.send(&[b"QUIT"]).await;
    assert_eq!(h.recv_reply().await, Reply::SimpleString("OK".to_string()));

    let mut buf = [0u8; 8];
    let n = h.client.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "proxy should close the connection after QUIT");
}

/// P7: pipelined commands on one connection are answered in arrival order.
#[tokio::test]
async fn pipelined_replies_preserve_order() {
    let mut h = Harness::start("", false, false, vec![], vec![]).await;

    h.send(&[b"PING"]).await;
    h.send(&[b"PING"]).await;
    h.send(&[b"PING"]).await;

    for _ in 0..3 {
        assert_eq!(h.recv_reply().await, Reply::SimpleString("PONG".to_string()));
    }
}

/// A destination transport failure on GET surfaces an error and never
/// falls back to source.
#[tokio::test]
async fn destination_transport_failure_skips_source_fallback() {
    // Bind a listener but close it immediately: nothing answers this
    // address, so the destination pool's dial fails with a transport
    // error as soon as the dispatcher tries to acquire a connection.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = listener.local_addr().unwrap();
    drop(listener);

    let source = FakeBackend::spawn(vec![]).await;
    let config = Config {
        password: String::new(),
        delete_on_get: false,
        delete_on_set: false,
        source: backend_config(&source),
        destination: BackendConfig {
            addr: dead_addr.to_string(),
            password: String::new(),
            max_idle_conns: 4,
            idle_timeout: remiro::Duration::from_secs(60),
        },
        path: String::new(),
    };

    let state = ProxyState::new(&config);
    let listener = bind("127.0.0.1", 0).unwrap();
    let proxy_addr = listener.local_addr().unwrap();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(serve(listener, state, shutdown_rx));

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client
        .write_all(&encode_command(&[b"GET", b"mykey"]))
        .await
        .unwrap();

    let mut buf = BytesMut::with_capacity(4096);
    let reply = loop {
        if let Some(reply) = parse_reply(&mut buf).unwrap() {
            break reply;
        }
        let n = client.read_buf(&mut buf).await.unwrap();
        assert_ne!(n, 0);
    };
    assert!(matches!(reply, Reply::Error(_)));
    assert_eq!(source.call_count(), 0);
}

/// Spawns a fake destination that accepts a connection, reads one command
/// frame, then drops the socket without ever writing a reply — simulating a
/// backend that dies mid-command. Once that first connection's caller has
/// observed the transport failure, a second accept serves `second_reply` for
/// whatever the pool dials next. Returns the listening address and the
/// number of connections accepted so far.
async fn spawn_dying_then_healthy_backend(
    second_reply: &'static [u8],
) -> (std::net::SocketAddr, Arc<Mutex<usize>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(Mutex::new(0usize));
    let accepts_task = accepts.clone();

    tokio::spawn(async move {
        {
            let (mut stream, _) = listener.accept().await.unwrap();
            *accepts_task.lock().unwrap() += 1;
            let mut buf = BytesMut::with_capacity(4096);
            loop {
                if parse_command(&mut buf).unwrap().is_some() {
                    break;
                }
                let n = stream.read_buf(&mut buf).await.unwrap();
                assert_ne!(n, 0, "test setup: client closed before sending a full frame");
            }
            // `stream` drops here: the socket closes without a reply, so
            // the caller's `do_cmd` observes an EOF/transport failure.
        }

        let (mut stream, _) = listener.accept().await.unwrap();
        *accepts_task.lock().unwrap() += 1;
        let mut buf = BytesMut::with_capacity(4096);
        loop {
            if parse_command(&mut buf).unwrap().is_some() {
                break;
            }
            let n = stream.read_buf(&mut buf).await.unwrap();
            assert_ne!(n, 0);
        }
        stream.write_all(second_reply).await.unwrap();
    });

    (addr, accepts)
}

/// Extracts the current value of `remiro_backend_commands_total{target,
/// command}` out of a Prometheus text-exposition dump.
fn counter_value(text: &str, target: &str, command: &str) -> f64 {
    for line in text.lines() {
        if line.starts_with("remiro_backend_commands_total{")
            && line.contains(&format!("target=\"{target}\""))
            && line.contains(&format!("command=\"{command}\""))
        {
            if let Some(value) = line.rsplit(' ').next() {
                return value.parse().unwrap_or(0.0);
            }
        }
    }
    0.0
}

/// A connection that faults mid-command must not be handed back out by the
/// pool: the following dispatch on the same backend pool has to dial a fresh
/// connection rather than reuse the dead socket (spec.md §7.2, §4.A).
#[tokio::test]
async fn dead_destination_connection_is_not_reused_after_transport_failure() {
    let (dest_addr, accepts) = spawn_dying_then_healthy_backend(b"+OK\r\n").await;
    let source = FakeBackend::spawn(vec![]).await;

    let config = Config {
        password: String::new(),
        delete_on_get: false,
        delete_on_set: false,
        source: backend_config(&source),
        destination: BackendConfig {
            addr: dest_addr.to_string(),
            password: String::new(),
            max_idle_conns: 4,
            idle_timeout: remiro::Duration::from_secs(60),
        },
        path: String::new(),
    };

    let state = ProxyState::new(&config);
    let listener = bind("127.0.0.1", 0).unwrap();
    let proxy_addr = listener.local_addr().unwrap();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(serve(listener, state, shutdown_rx));

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let mut buf = BytesMut::with_capacity(4096);

    async fn recv(client: &mut TcpStream, buf: &mut BytesMut) -> Reply {
        loop {
            if let Some(reply) = parse_reply(buf).unwrap() {
                return reply;
            }
            let n = client.read_buf(buf).await.unwrap();
            assert_ne!(n, 0, "proxy closed connection without a reply");
        }
    }

    // First SET dies mid-command: the pool's only connection faults and the
    // client observes a transport error.
    client
        .write_all(&encode_command(&[b"SET", b"mykey", b"hello"]))
        .await
        .unwrap();
    assert!(matches!(recv(&mut client, &mut buf).await, Reply::Error(_)));

    // The faulted connection sits back in the pool's idle slot on drop, but
    // must be discarded (not handed out) the next time it's recycled.
    client
        .write_all(&encode_command(&[b"SET", b"mykey", b"world"]))
        .await
        .unwrap();
    assert_eq!(
        recv(&mut client, &mut buf).await,
        Reply::SimpleString("OK".to_string())
    );

    assert_eq!(*accepts.lock().unwrap(), 2, "pool should have dialed a fresh connection");
}

/// spec.md §4.F point 5: "Every backend call increments the command counter
/// tagged accordingly" — this must hold even when the call itself
/// transport-fails, not only on success.
#[tokio::test]
async fn counter_increments_when_backend_call_transport_fails() {
    let (dest_addr, _accepts) = spawn_dying_then_healthy_backend(b"$-1\r\n").await;
    let source = FakeBackend::spawn(vec![]).await;

    let config = Config {
        password: String::new(),
        delete_on_get: false,
        delete_on_set: false,
        source: backend_config(&source),
        destination: BackendConfig {
            addr: dest_addr.to_string(),
            password: String::new(),
            max_idle_conns: 4,
            idle_timeout: remiro::Duration::from_secs(60),
        },
        path: String::new(),
    };

    let state = ProxyState::new(&config);
    let listener = bind("127.0.0.1", 0).unwrap();
    let proxy_addr = listener.local_addr().unwrap();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(serve(listener, state, shutdown_rx));

    let before = counter_value(
        &String::from_utf8(remiro::metrics::gather_text().unwrap()).unwrap(),
        "destination",
        "GET",
    );

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client
        .write_all(&encode_command(&[b"GET", b"counterkey"]))
        .await
        .unwrap();

    let mut buf = BytesMut::with_capacity(4096);
    let reply = loop {
        if let Some(reply) = parse_reply(&mut buf).unwrap() {
            break reply;
        }
        let n = client.read_buf(&mut buf).await.unwrap();
        assert_ne!(n, 0);
    };
    assert!(matches!(reply, Reply::Error(_)));

    let after = counter_value(
        &String::from_utf8(remiro::metrics::gather_text().unwrap()).unwrap(),
        "destination",
        "GET",
    );
    assert_eq!(after, before + 1.0);
}
