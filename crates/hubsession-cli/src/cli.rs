//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Hub address, overriding the configuration file
    #[arg(long)]
    pub hub: Option<String>,

    /// Active search interval in milliseconds
    #[arg(long)]
    pub search_interval: Option<u64>,

    /// Passive search interval in milliseconds
    #[arg(long)]
    pub search_interval_passive: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a JSON-lines script of protocol steps through a session
    Replay {
        /// Script file; one step per line
        script: PathBuf,
    },
    /// Print the effective configuration as TOML
    Config,
    /// Decode a feature announcement and show the resulting capabilities
    Features {
        /// Which vocabulary to decode with
        #[arg(short, long, value_enum, default_value_t = FeatureKind::AdcHub)]
        kind: FeatureKind,
        /// Feature tokens, separated by spaces or commas
        #[arg(required = true)]
        tokens: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FeatureKind {
    AdcHub,
    AdcUser,
    NmdcHub,
}
