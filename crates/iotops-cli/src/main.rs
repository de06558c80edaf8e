//! iotops - IoT Hub state and Digital Twins model management
//!
//! Results are printed to stdout as JSON, logs go to stderr.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use iotops_rest::RestClient;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::commands::Command;

#[derive(Parser, Debug)]
#[command(name = "iotops")]
#[command(about = "IoT Hub state export/import and Digital Twins model management")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "iotops.toml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    debug!("iotops v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(&args.config)?;
    info!(
        timeout_secs = config.http.timeout_secs,
        hubs = config.hubs.len(),
        digital_twins = config.digital_twins.len(),
        "Configuration loaded"
    );

    let client = RestClient::new(Duration::from_secs(config.http.timeout_secs))?;
    commands::run(args.command, &config, &client).await
}
