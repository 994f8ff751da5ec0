//! Per-connection command dispatcher and migration policy engine
//! (spec.md §4.F, the heart of the proxy) and the accept loop that drives it.

mod core;
mod dispatch;
mod entrypoint;
mod state;

pub use core::Client;
pub use entrypoint::{bind, run_accept_loop, serve};
pub use state::ProxyState;
