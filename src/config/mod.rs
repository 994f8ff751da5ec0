//! Configuration module: the Configuration Record of spec.md §3, loaded
//! from a TOML file and made available process-wide.
//!
//! Grounded on the teacher's `config/mod.rs`: a process-wide `ArcSwap<Config>`
//! singleton populated once at startup by `parse()`, read anywhere via
//! `get_config()`.

use arc_swap::ArcSwap;
use log::info;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

pub mod duration;

#[cfg(test)]
mod tests;

pub use duration::Duration;

use crate::errors::Error;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Globally available configuration. Replaced wholesale on (re)load; never
/// mutated in place.
static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Per-backend connection settings (spec.md §3: "For each of {source,
/// destination}: address, optional password, max-idle-connections,
/// idle-timeout duration").
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BackendConfig {
    /// `host:port` of the backing store.
    #[serde(rename = "Addr")]
    pub addr: String,

    /// Empty/absent means the backend does not require AUTH on connect.
    #[serde(rename = "Password", default)]
    pub password: String,

    #[serde(rename = "MaxIdleConns", default = "BackendConfig::default_max_idle")]
    pub max_idle_conns: usize,

    #[serde(rename = "IdleTimeout", default = "BackendConfig::default_idle_timeout")]
    pub idle_timeout: Duration,
}

impl BackendConfig {
    fn default_max_idle() -> usize {
        8
    }

    fn default_idle_timeout() -> Duration {
        Duration::from_secs(60)
    }

    fn validate(&self, which: &str) -> Result<(), Error> {
        if self.addr.trim().is_empty() {
            return Err(Error::Config(format!("{which}.Addr must not be empty")));
        }
        if self.max_idle_conns == 0 {
            return Err(Error::Config(format!(
                "{which}.MaxIdleConns must be greater than zero"
            )));
        }
        Ok(())
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            addr: String::from("127.0.0.1:6379"),
            password: String::new(),
            max_idle_conns: Self::default_max_idle(),
            idle_timeout: Self::default_idle_timeout(),
        }
    }
}

/// The full Configuration Record (spec.md §3), immutable after start.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Empty means authentication is disabled (spec.md I1).
    #[serde(rename = "Password", default)]
    pub password: String,

    #[serde(rename = "DeleteOnGet", default)]
    pub delete_on_get: bool,

    #[serde(rename = "DeleteOnSet", default)]
    pub delete_on_set: bool,

    #[serde(rename = "Source")]
    pub source: BackendConfig,

    #[serde(rename = "Destination")]
    pub destination: BackendConfig,

    /// Path this config was loaded from; not part of the TOML schema.
    #[serde(skip)]
    pub path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            password: String::new(),
            delete_on_get: false,
            delete_on_set: false,
            source: BackendConfig::default(),
            destination: BackendConfig::default(),
            path: String::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), Error> {
        self.source.validate("Source")?;
        self.destination.validate("Destination")?;
        Ok(())
    }

    pub fn show(&self) {
        info!(
            "auth: {}",
            if self.password.is_empty() {
                "disabled"
            } else {
                "enabled"
            }
        );
        info!("delete_on_get: {}", self.delete_on_get);
        info!("delete_on_set: {}", self.delete_on_set);
        info!(
            "source: {} (max_idle={}, idle_timeout={}ms)",
            self.source.addr,
            self.source.max_idle_conns,
            self.source.idle_timeout.as_millis()
        );
        info!(
            "destination: {} (max_idle={}, idle_timeout={}ms)",
            self.destination.addr,
            self.destination.max_idle_conns,
            self.destination.idle_timeout.as_millis()
        );
    }
}

/// Returns a cloned snapshot of the current configuration. ArcSwap makes
/// this cheap: a clone of an `Arc` plus a clone of the (small) `Config`.
pub fn get_config() -> Config {
    (*(*CONFIG.load())).clone()
}

/// Parses, validates, and installs the configuration found at `path`.
pub async fn parse(path: &str) -> Result<(), Error> {
    let mut contents = String::new();
    let mut file = File::open(path)
        .await
        .map_err(|err| Error::Config(format!("could not open '{path}': {err}")))?;
    file.read_to_string(&mut contents)
        .await
        .map_err(|err| Error::Config(format!("could not read '{path}': {err}")))?;

    let mut config: Config = toml::from_str(&contents)
        .map_err(|err| Error::Config(format!("could not parse '{path}': {err}")))?;

    config.validate()?;
    config.path = path.to_string();

    CONFIG.store(Arc::new(config));
    Ok(())
}

/// Installs a configuration directly, bypassing file IO. Used by tests and
/// by callers that already hold a validated `Config`.
pub fn set_for_test(config: Config) {
    CONFIG.store(Arc::new(config));
}
