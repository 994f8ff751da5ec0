use std::io::{self, IsTerminal, Write};

use log::error;
use tokio::runtime::Builder;

use crate::config::{get_config, Config};

use super::args::Args;

/// Parses and validates the config file named by `args.config`, exiting the
/// process with `exitcode::CONFIG` on failure (same contract as the
/// teacher's `init_config`, minus config-file `include` support, which this
/// crate's single-file TOML schema has no use for).
pub fn init_config(args: &Args) -> Config {
    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .build()
        .expect("failed to build temporary config-parsing runtime");

    runtime.block_on(async {
        if let Err(err) = crate::config::parse(args.config.as_str()).await {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                eprintln!("Config parse error: {err}");
                io::stdout().flush().unwrap();
            } else {
                error!("Config parse error: {err:?}");
            }
            std::process::exit(exitcode::CONFIG);
        }
    });

    get_config()
}
