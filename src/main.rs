use std::process;

use remiro::app;

fn main() {
    let args = app::parse_args();
    let config = app::init_config(&args);
    app::init_logging(&args);

    match app::run_server(args, config) {
        Ok(()) => process::exit(exitcode::OK),
        Err(err) => {
            log::error!("server exited with an error: {err}");
            process::exit(exitcode::OSERR);
        }
    }
}
