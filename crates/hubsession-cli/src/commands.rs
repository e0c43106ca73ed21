//! Command handlers for the hub session CLI

use std::fs::File;
use std::io::{self, BufReader, Write};

use hubsession_core::{DecodedFeatures, FeatureNegotiator};
use serde_json::json;
use tracing::info;

use crate::cli::{Cli, Commands, FeatureKind};
use crate::config::AppConfig;
use crate::error::Result;
use crate::replay::Replayer;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Replay { script } => {
                info!("Replaying script {}", script.display());
                let reader = BufReader::new(File::open(&script)?);
                Self::handle_replay(&config, reader, io::stdout().lock()).await
            }
            Commands::Config => Self::handle_config(&config, io::stdout().lock()),
            Commands::Features { kind, tokens } => {
                Self::handle_features(kind, &tokens, io::stdout().lock())
            }
        }
    }

    /// Replay a script and print every record to `out`
    pub async fn handle_replay<R: io::BufRead, W: Write>(
        config: &AppConfig,
        reader: R,
        out: W,
    ) -> Result<()> {
        let mut replayer = Replayer::start(config, out).await?;
        replayer.run_script(reader)?;
        let summary = replayer.finish().await?;
        info!(
            steps = summary.steps,
            errors = summary.errors,
            final_state = %summary.final_state,
            "replay finished"
        );
        Ok(())
    }

    /// Print the effective configuration
    pub fn handle_config<W: Write>(config: &AppConfig, mut out: W) -> Result<()> {
        write!(out, "{}", config.to_toml()?)?;
        Ok(())
    }

    /// Decode feature tokens with the chosen vocabulary
    pub fn handle_features<W: Write>(kind: FeatureKind, tokens: &[String], mut out: W) -> Result<()> {
        let negotiator = match kind {
            FeatureKind::AdcHub => FeatureNegotiator::adc_hub(),
            FeatureKind::AdcUser => FeatureNegotiator::adc_user(),
            FeatureKind::NmdcHub => FeatureNegotiator::nmdc_hub(),
        };
        let decoded: DecodedFeatures = negotiator.decode(&tokens.join(" "));
        let record = json!({
            "vocabulary": negotiator.vocabulary().name,
            "capabilities": decoded.capabilities,
            "recognized": negotiator.tokens(&decoded.capabilities),
            "unknown": decoded.unknown,
        });
        serde_json::to_writer_pretty(&mut out, &record)?;
        writeln!(out)?;
        Ok(())
    }
}
