//! Lookout unified launcher.
//!
//! Long-running edge service that classifies newly arriving camera
//! images and routes each one to emit or discard actions based on the
//! detected label and a confidence threshold.
//!
//! Usage:
//!     lookout watch --config config.yml
//!     lookout bus --config config.yml

mod app;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use lookout_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "lookout", about = "Edge image classification dispatch service")]
struct Cli {
    /// Enable verbose console logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch a directory for new images, upload detections over FTP
    Watch,
    /// Consume images from the MQTT bus, publish detections back to it
    Bus,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    init_logging(LogConfig {
        level: &config.logging.level,
        filename: config.logging.filename.as_deref(),
        verbose: cli.verbose,
    })?;

    info!("starting lookout");
    info!("  config: {}", cli.config.display());
    info!("  model dir: {}", config.inference.model_dir.display());
    info!("  threshold: {}", config.inference.threshold);
    info!("  target label: {}", config.inference.target_label);

    match cli.command {
        Commands::Watch => app::run_watch(config).await,
        Commands::Bus => app::run_bus(config).await,
    }
}
