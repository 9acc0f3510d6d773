//! Web server command.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use taskpulse_core::ServerConfig;
use tracing::info;

use super::ConfigSource;

#[derive(Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub source: ConfigSource,

    /// Also write logs to a file
    #[arg(long)]
    pub log: bool,

    /// Log file path (defaults to ./taskpulse.log)
    #[arg(long, requires = "log")]
    pub log_file: Option<PathBuf>,
}

fn print_banner(config: &ServerConfig) {
    let addr = config.bind_addr();

    println!();
    println!("  {} {}", "TaskPulse".cyan().bold(), "Server".bold());
    println!();
    println!("  {}  ws://{}/ws", "WebSocket".green(), addr);
    println!("  {}   http://{}/stocks/stream", "Stream".green(), addr);
    println!("  {}   http://{}/stocks", "Prices".green(), addr);
    println!("  {}      http://{}/api", "API".green(), addr);
    println!(
        "  {}     every {} ms",
        "Ticks".green(),
        config.tick_interval_ms
    );
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let config = args.source.resolve()?;
    print_banner(&config);
    info!(addr = %config.bind_addr(), cors_origin = %config.cors_origin, "Starting server");

    taskpulse_web::run_server(config).await?;

    Ok(())
}
