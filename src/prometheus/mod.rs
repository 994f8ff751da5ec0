//! Instrumentation HTTP server: multiplexes `/health` and `/metrics` on one
//! listener bound to `--instru-port` (SPEC_FULL.md §E).

mod server;

pub use server::start_instrumentation_server;
