//! The migration policy engine: for each inbound command frame, decides
//! which backend(s) to call and assembles the reply (spec.md §4.F).

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use log::{trace, warn};

use crate::errors::Error;
use crate::metrics::{record_backend_command, start_latency_timer, Target};
use crate::pool::{BackendManager, BackendPool, Object};
use crate::resp::{CommandFrame, Reply};

use super::state::ProxyState;

/// What the dispatcher wants the connection loop to do after one frame.
pub struct DispatchOutcome {
    pub reply: Reply,
    pub close: bool,
}

impl DispatchOutcome {
    fn reply(reply: Reply) -> Self {
        Self {
            reply,
            close: false,
        }
    }
}

/// Runs the full prologue-plus-command-handling pipeline for one frame
/// (spec.md §4.F). The latency timer is recorded on every exit path.
pub async fn dispatch(
    state: &Arc<ProxyState>,
    addr: SocketAddr,
    frame: &CommandFrame,
) -> DispatchOutcome {
    let timer = start_latency_timer();
    let outcome = dispatch_inner(state, addr, frame).await;
    timer.observe();
    outcome
}

async fn dispatch_inner(
    state: &Arc<ProxyState>,
    addr: SocketAddr,
    frame: &CommandFrame,
) -> DispatchOutcome {
    let Some(raw_name) = frame.name() else {
        return DispatchOutcome::reply(Reply::Error(
            "ERR empty command".to_string(),
        ));
    };
    let name = String::from_utf8_lossy(raw_name).to_uppercase();
    trace!("dispatch {name} ({} args)", frame.arity());

    if state.auth_required()
        && name != "AUTH"
        && name != "QUIT"
        && !state.auth.is_authenticated(addr)
    {
        return DispatchOutcome::reply(Reply::Error(
            "NOAUTH Authentication required.".to_string(),
        ));
    }

    match name.as_str() {
        "GET" => DispatchOutcome::reply(handle_get(state, frame).await),
        "SET" => DispatchOutcome::reply(handle_set(state, frame).await),
        "PING" => DispatchOutcome::reply(Reply::SimpleString("PONG".to_string())),
        "QUIT" => DispatchOutcome {
            reply: Reply::SimpleString("OK".to_string()),
            close: true,
        },
        "AUTH" => DispatchOutcome::reply(handle_auth(state, addr, frame)),
        _ => DispatchOutcome::reply(handle_default(state, &name, frame).await),
    }
}

/// Issues one command against a backend pool, tagging the metrics counter.
/// Returns `Err` only for a transport/pool failure; a backend's own
/// protocol-level error reply comes back as `Ok(Reply::Error(_))`.
async fn call(pool: &BackendPool, command: &str, parts: &[&[u8]]) -> Result<Reply, Error> {
    let mut conn = pool.acquire().await?;
    call_on(&mut conn, pool.target, command, parts).await
}

/// Renders any dispatcher-surfaced error as a reply. A backend protocol
/// error is forwarded verbatim (byte-exact, since client libraries may
/// pattern-match on it); anything else (transport/pool/framing) gets an
/// `ERR` prefix in the usual Redis style.
fn reply_for_error(err: Error) -> Reply {
    match err {
        Error::BackendProtocol(text) => Reply::Error(text),
        other => Reply::Error(format!("ERR {other}")),
    }
}

/// Acquires one connection from `pool` for the whole of one inbound
/// command's handling. Spec.md I3 allows at most one acquisition per
/// backend per inbound command; GET's promotion path issues a second
/// command (SET, then maybe DEL) against the same backend it already
/// talked to, so that second command must reuse this same connection
/// rather than acquiring again.
async fn acquire(pool: &BackendPool) -> Result<Object<BackendManager>, Error> {
    Ok(pool.acquire().await?)
}

/// Issues one command over an already-acquired connection, tagging the
/// metrics counter. The counter is incremented unconditionally right after
/// the call returns (spec.md §4.F point 5: "Every backend call increments
/// the command counter tagged accordingly") — including when `do_cmd`
/// fails with a transport error, so a dead backend doesn't go uncounted.
async fn call_on(
    conn: &mut Object<BackendManager>,
    target: Target,
    command: &str,
    parts: &[&[u8]],
) -> Result<Reply, Error> {
    let result = conn.do_cmd(parts).await;
    record_backend_command(target, command);
    Ok(result?)
}

async fn handle_get(state: &Arc<ProxyState>, frame: &CommandFrame) -> Reply {
    if frame.arity() < 2 {
        return Reply::Error("ERR wrong number of arguments for 'get' command".to_string());
    }
    let parts: Vec<&[u8]> = frame.parts.iter().map(|b| b.as_ref()).collect();
    let key = frame.arg(1).unwrap().clone();

    let mut dest_conn = match acquire(&state.destination).await {
        Ok(c) => c,
        Err(e) => return reply_for_error(e),
    };

    let dest_reply = match call_on(&mut dest_conn, state.destination.target, "GET", &parts).await
    {
        Ok(r) => r,
        Err(e) => return reply_for_error(e),
    };

    match dest_reply.as_bulk_string() {
        Ok(Some(value)) => Reply::Bulk(value),
        Err(e) => reply_for_error(e),
        Ok(None) => get_fallback_to_source(state, &mut dest_conn, &key, &parts).await,
    }
}

async fn get_fallback_to_source(
    state: &Arc<ProxyState>,
    dest_conn: &mut Object<BackendManager>,
    key: &Bytes,
    parts: &[&[u8]],
) -> Reply {
    let mut src_conn = match acquire(&state.source).await {
        Ok(c) => c,
        Err(e) => return reply_for_error(e),
    };

    let src_reply = match call_on(&mut src_conn, state.source.target, "GET", parts).await {
        Ok(r) => r,
        Err(e) => return reply_for_error(e),
    };

    let value = match src_reply.as_bulk_string() {
        Ok(Some(v)) => v,
        Ok(None) => return Reply::Null,
        Err(e) => return reply_for_error(e),
    };

    promote(state, dest_conn, &mut src_conn, key, &value).await;
    Reply::Bulk(value)
}

/// Best-effort writeback of a promoted value into destination, and (if
/// configured) invalidation of the now-stale source copy. Never surfaced to
/// the client; failures are only logged (spec.md §4.F "Writebacks"). Reuses
/// the destination and source connections GET already acquired (spec.md I3).
async fn promote(
    state: &Arc<ProxyState>,
    dest_conn: &mut Object<BackendManager>,
    src_conn: &mut Object<BackendManager>,
    key: &Bytes,
    value: &Bytes,
) {
    let set_parts: [&[u8]; 3] = [b"SET", key.as_ref(), value.as_ref()];
    let set_ok = match call_on(dest_conn, state.destination.target, "SET", &set_parts).await {
        Ok(reply) if !reply.is_error() => true,
        Ok(reply) => {
            warn!(
                "promotion SET to destination returned an error: {:?}",
                reply.error_text()
            );
            false
        }
        Err(e) => {
            warn!("promotion SET to destination failed: {e}");
            false
        }
    };

    if state.delete_on_get && set_ok {
        let del_parts: [&[u8]; 2] = [b"DEL", key.as_ref()];
        if let Err(e) = call_on(src_conn, state.source.target, "DEL", &del_parts).await {
            warn!("invalidation DEL on source failed: {e}");
        }
    }
}

async fn handle_set(state: &Arc<ProxyState>, frame: &CommandFrame) -> Reply {
    if frame.arity() < 3 {
        return Reply::Error("ERR wrong number of arguments for 'set' command".to_string());
    }
    let parts: Vec<&[u8]> = frame.parts.iter().map(|b| b.as_ref()).collect();
    let key = frame.arg(1).unwrap();
    let key_str = String::from_utf8_lossy(key).into_owned();

    let reply = match call(&state.destination, "SET", &parts).await {
        Ok(r) => r,
        Err(e) => return reply_for_error(e),
    };

    if reply.is_error() {
        return reply;
    }

    if state.delete_on_set && !state.memo.contains(&key_str) {
        let del_parts: [&[u8]; 2] = [b"DEL", key.as_ref()];
        match call(&state.source, "DEL", &del_parts).await {
            Ok(del_reply) if !del_reply.is_error() => state.memo.mark(&key_str),
            Ok(_) => {}
            Err(e) => warn!("invalidation DEL on source failed: {e}"),
        }
    }

    reply
}

fn handle_auth(state: &Arc<ProxyState>, addr: SocketAddr, frame: &CommandFrame) -> Reply {
    if frame.arity() != 2 {
        return Reply::Error("ERR wrong number of arguments for 'auth' command".to_string());
    }
    if state.password.is_empty() {
        return Reply::Error("ERR Client sent AUTH, but no password is set".to_string());
    }

    let given = frame.arg(1).unwrap();
    if given.as_ref() == state.password.as_bytes() {
        state.auth.set_authenticated(addr, true);
        Reply::SimpleString("OK".to_string())
    } else {
        state.auth.set_authenticated(addr, false);
        Reply::Error("ERR invalid password".to_string())
    }
}

async fn handle_default(state: &Arc<ProxyState>, name: &str, frame: &CommandFrame) -> Reply {
    let parts: Vec<&[u8]> = frame.parts.iter().map(|b| b.as_ref()).collect();
    match call(&state.destination, name, &parts).await {
        Ok(reply) => reply,
        Err(e) => reply_for_error(e),
    }
}
