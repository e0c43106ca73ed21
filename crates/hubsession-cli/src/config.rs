//! Hub Session CLI Configuration
//!
//! Configuration is layered: defaults, then an optional TOML file, then
//! command line overrides.
//!
//! ```toml
//! [session]
//! hub_url = "adcs://hub.example.org:411"
//! keepalive_interval_ms = 118000
//!
//! [session.search]
//! interval_ms = 10000
//! interval_passive_ms = 10000
//!
//! [ticker]
//! tick_interval_ms = 1000
//!
//! [output]
//! pretty = false
//! ```

use std::path::Path;

use hubsession_core::{Dialect, SessionConfig};
use hubsession_runtime::TickerConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::Cli;
use crate::error::Result;

const DEFAULT_HUB_URL: &str = "adc://127.0.0.1:411";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub ticker: TickerConfig,
    pub output: OutputConfig,
}

/// How replay output is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Pretty-print each JSON record instead of one record per line
    pub pretty: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::for_hub(DEFAULT_HUB_URL),
            ticker: TickerConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file; missing keys take their defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply command line overrides on top of the loaded values
    pub fn apply_overrides(&mut self, cli: &Cli) -> Result<()> {
        if let Some(hub) = &cli.hub {
            debug!(hub = %hub, "hub address overridden on the command line");
            self.session.hub_url = hub.clone();
            if let Some(dialect) = Dialect::from_url(hub) {
                self.session.dialect = dialect;
            }
        }
        if let Some(interval) = cli.search_interval {
            self.session.search.interval_ms = interval;
        }
        if let Some(interval) = cli.search_interval_passive {
            self.session.search.interval_passive_ms = interval;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.ticker.validate()?;
        Ok(())
    }
}
