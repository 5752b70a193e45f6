//! `prana` - command-line client for Prana ventilation units.

mod cli;
mod commands;
mod config;
mod format;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{WatchArgs, cmd_config, cmd_set, cmd_state, cmd_watch};
use config::{Config, default_config_path};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Quiet wins over RUST_LOG; verbose forces debug.
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = if config_path.exists() {
        Config::load_validated(&config_path)?
    } else {
        tracing::debug!("No config file at {}, using defaults", config_path.display());
        Config::default()
    };

    match &cli.command {
        Commands::State { device, format } => cmd_state(device, *format, &config).await?,
        Commands::Set {
            device,
            format,
            setting,
        } => cmd_set(device, setting, *format, &config).await?,
        Commands::Watch {
            device,
            interval,
            count,
            format,
        } => {
            let args = WatchArgs {
                device,
                interval: *interval,
                count: *count,
                format: *format,
            };
            cmd_watch(args, &config, cli.quiet).await?
        }
        Commands::Config { action } => cmd_config(action, &config_path, &config)?,
    }

    Ok(())
}
