use log::{error, info};
#[cfg(not(windows))]
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tokio::runtime::Builder;
use tokio::sync::broadcast;

use crate::client::{run_accept_loop, ProxyState};
use crate::config::Config;
use crate::prometheus::start_instrumentation_server;

use super::args::Args;

/// Builds the tokio runtime and drives the accept loop and instrumentation
/// server until a shutdown signal arrives (spec.md §4.G, SPEC_FULL.md §E).
///
/// Grounded in the teacher's `app/server.rs` runtime bootstrap, trimmed of
/// CPU affinity pinning, daemonization, and foreground binary upgrade —
/// none of which this crate's listener has a counterpart for.
pub fn run_server(args: Args, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .thread_name("worker-remiro")
        .build()?;

    runtime.block_on(async move {
        config.show();
        let state = ProxyState::new(&config);

        let (shutdown_tx, _) = broadcast::channel(1);

        let accept_task = {
            let host = args.host.clone();
            let port = args.port;
            let state = state.clone();
            let shutdown = shutdown_tx.subscribe();
            tokio::spawn(async move { run_accept_loop(&host, port, state, shutdown).await })
        };

        let instrumentation_task = {
            let host = args.host.clone();
            let port = args.instru_port;
            let state = state.clone();
            let shutdown = shutdown_tx.subscribe();
            tokio::spawn(async move {
                start_instrumentation_server(&host, port, state, shutdown).await
            })
        };

        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(());

        match accept_task.await {
            Ok(Ok(())) => (),
            Ok(Err(e)) => error!("accept loop exited with an error: {e}"),
            Err(e) => error!("accept loop task panicked: {e}"),
        }
        match instrumentation_task.await {
            Ok(Ok(())) => (),
            Ok(Err(e)) => error!("instrumentation server exited with an error: {e}"),
            Err(e) => error!("instrumentation server task panicked: {e}"),
        }

        info!("shutting down");
        Ok(())
    })
}

#[cfg(not(windows))]
async fn wait_for_shutdown_signal() {
    let mut term_signal =
        unix_signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut interrupt_signal =
        unix_signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = term_signal.recv() => info!("got SIGTERM"),
        _ = interrupt_signal.recv() => info!("got SIGINT"),
    }
}

#[cfg(windows)]
async fn wait_for_shutdown_signal() {
    let mut ctrl_c = tokio::signal::windows::ctrl_c().expect("failed to install ctrl-c handler");
    ctrl_c.recv().await;
    info!("got ctrl-c");
}
