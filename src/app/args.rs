use clap::{Parser, ValueEnum};
use tracing::Level;

/// remiro: a RESP migration proxy that reads through and writes through two
/// backing stores while a migration is in flight.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address the client-facing RESP listener binds to.
    #[arg(long, default_value = "127.0.0.1", env)]
    pub host: String,

    /// Port the client-facing RESP listener binds to.
    #[arg(short, long, default_value_t = 6379, env)]
    pub port: u16,

    /// Port the `/health` and `/metrics` instrumentation server binds to,
    /// on the same host as `--host`.
    #[arg(long, default_value_t = 8888, env)]
    pub instru_port: u16,

    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml", env)]
    pub config: String,

    #[arg(short, long, default_value_t = tracing::Level::INFO, env)]
    pub log_level: Level,

    #[clap(short = 'F', long, value_enum, default_value_t = LogFormat::Text, env)]
    pub log_format: LogFormat,

    #[arg(
        short,
        long,
        default_value_t = false,
        env,
        help = "disable colors in the log output"
    )]
    pub no_color: bool,
}

pub fn parse() -> Args {
    Args::parse()
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
    Pretty,
}
