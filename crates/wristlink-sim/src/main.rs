//! Wristlink simulator - drives a phone endpoint from a simulated watch

mod cli;
mod exchange;
mod scenario;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wristlink_core::{ClientConfig, WristlinkConfig};

use crate::cli::Cli;
use crate::scenario::Scenario;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = load_configuration(&cli)?;
    if let Some(chunk_size) = cli.chunk_size {
        config = config.with_client(ClientConfig { chunk_size });
        config.validate()?;
    }
    let scenario = load_scenario(&cli)?;

    let report = exchange::run(config, scenario, cli.audio_bytes, cli.unreachable).await?;

    for line in &report.transcript {
        println!("{}", line);
    }
    info!(
        "Presses fired: {}, failed: {}",
        report.presses_fired, report.presses_failed
    );
    info!(
        "Phone handled {} request(s), {} message(s), {} blob(s)",
        report.stats.requests, report.stats.messages, report.stats.blobs
    );
    Ok(())
}

/// Setup logging; RUST_LOG overrides the verbosity flag
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> anyhow::Result<WristlinkConfig> {
    match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            let source = std::fs::read_to_string(path)?;
            Ok(WristlinkConfig::from_toml(&source)?)
        }
        None => {
            info!("Using default configuration");
            Ok(WristlinkConfig::default())
        }
    }
}

fn load_scenario(cli: &Cli) -> anyhow::Result<Scenario> {
    match &cli.scenario {
        Some(path) => Scenario::from_toml(&std::fs::read_to_string(path)?),
        None => Ok(Scenario::default()),
    }
}
