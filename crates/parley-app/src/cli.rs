//! Command-line arguments for the Parley server.
//!
//! Priority resolution: CLI args > `PARLEY_*` env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use parley_core::config::ParleyConfig;

/// Parley - a conversational chat backend that delegates replies to an agent.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Address to bind the HTTP server to.
    #[arg(long = "host")]
    pub host: Option<String>,

    /// HTTP server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// SQLite database path or `:memory:`.
    #[arg(short = 'd', long = "database")]
    pub database: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PARLEY_CONFIG env var > ~/.parley/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_with(|key| std::env::var(key).ok())
    }

    fn resolve_config_path_with<F>(&self, lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = lookup("PARLEY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path(lookup("HOME"))
    }

    /// Write flag values over the loaded configuration. Runs after env
    /// overrides so flags win.
    pub fn apply_overrides(&self, config: &mut ParleyConfig) {
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref url) = self.database {
            config.database.url = url.clone();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

fn default_config_path(home: Option<String>) -> PathBuf {
    match home {
        Some(home) => PathBuf::from(home).join(".parley").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}
