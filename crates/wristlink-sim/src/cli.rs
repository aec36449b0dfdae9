//! Command-line interface definitions and parsing

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Endpoint configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Home scenario file (TOML): actions, magic items, pipelines
    #[arg(short, long)]
    pub scenario: Option<String>,

    /// Size of the recorded audio sent to Assist
    #[arg(long, default_value_t = 48_000)]
    pub audio_bytes: usize,

    /// Override the watch-side chunk size
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Take the phone out of range after the first exchange
    #[arg(long)]
    pub unreachable: bool,
}
