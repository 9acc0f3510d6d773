//! CLI command definitions and handlers.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use taskpulse_core::ServerConfig;

pub mod config;
pub mod serve;

/// TaskPulse - real-time task board with live push streams
#[derive(Parser)]
#[command(name = "taskpulse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server
    Serve(serve::ServeArgs),

    /// Print the effective configuration as TOML
    Config(config::ConfigArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve(args) => serve::execute(args).await,
            Commands::Config(args) => config::execute(args),
        }
    }
}

/// Configuration sources shared by every command.
#[derive(Args, Debug, Default)]
pub struct ConfigSource {
    /// TOML configuration file
    #[arg(short, long, env = "TASKPULSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "TASKPULSE_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "TASKPULSE_PORT")]
    pub port: Option<u16>,

    /// Allowed CORS origin
    #[arg(long, env = "TASKPULSE_CORS_ORIGIN")]
    pub cors_origin: Option<String>,

    /// Ticker interval in milliseconds
    #[arg(long, env = "TASKPULSE_TICK_MS")]
    pub tick_ms: Option<u64>,
}

impl ConfigSource {
    /// Defaults, then the config file, then flags and environment.
    pub fn resolve(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(origin) = &self.cors_origin {
            config.cors_origin = origin.clone();
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_interval_ms = tick_ms;
        }

        config.validate()?;
        Ok(config)
    }
}
