//! Session Configuration
//!
//! Configuration structures consumed by a hub session. All values are plain
//! serde records so the CLI can load them from TOML and the runtime can
//! update search intervals while a session is live.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Largest accepted search interval (two minutes)
pub const MAX_SEARCH_INTERVAL_MS: u64 = 120_000;

/// Idle time in `Normal` after which a keep-alive is sent
pub const DEFAULT_KEEPALIVE_INTERVAL_MS: u64 = 118_000;

// ----------------------------------------------------------------------------
// Protocol Dialect
// ----------------------------------------------------------------------------

/// Hub protocol family, which selects the feature vocabularies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Adc,
    Nmdc,
}

impl Dialect {
    /// Guess the dialect from a hub address scheme
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split("://").next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "adc" | "adcs" => Some(Dialect::Adc),
            "dchub" | "nmdc" | "nmdcs" => Some(Dialect::Nmdc),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Search Interval Configuration
// ----------------------------------------------------------------------------

/// Minimum spacing between searches sent to one hub.
///
/// A value of 0 disables the gate for that mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchIntervalConfig {
    /// Gap after an active-mode search (milliseconds)
    pub interval_ms: u64,
    /// Gap after a passive-mode search (milliseconds)
    pub interval_passive_ms: u64,
}

impl Default for SearchIntervalConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            interval_passive_ms: 10_000,
        }
    }
}

impl SearchIntervalConfig {
    /// Create an interval pair
    pub fn new(interval_ms: u64, interval_passive_ms: u64) -> Self {
        Self {
            interval_ms,
            interval_passive_ms,
        }
    }

    /// No throttling: every queued search is eligible immediately
    pub fn unthrottled() -> Self {
        Self::new(0, 0)
    }

    /// Short gaps suitable for tests
    pub fn testing() -> Self {
        Self::new(100, 150)
    }

    /// Gap that applies after a search sent in the given mode
    pub fn gap_after(&self, passive: bool) -> u64 {
        if passive {
            self.interval_passive_ms
        } else {
            self.interval_ms
        }
    }

    /// Validate the interval values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms > MAX_SEARCH_INTERVAL_MS {
            return Err(ConfigError::IntervalTooLarge {
                field: "interval_ms",
                value: self.interval_ms,
                max: MAX_SEARCH_INTERVAL_MS,
            });
        }
        if self.interval_passive_ms > MAX_SEARCH_INTERVAL_MS {
            return Err(ConfigError::IntervalTooLarge {
                field: "interval_passive_ms",
                value: self.interval_passive_ms,
                max: MAX_SEARCH_INTERVAL_MS,
            });
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Configuration for a single hub session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hub address, e.g. `adc://hub.example.org:411`
    pub hub_url: String,
    /// Protocol family spoken by the hub
    pub dialect: Dialect,
    /// Search throttling
    pub search: SearchIntervalConfig,
    /// Idle time before a keep-alive is sent (0 disables keep-alives)
    pub keepalive_interval_ms: u64,
    /// Silence after which an in-progress bulk user list is considered done
    /// (0 disables inactivity inference)
    pub bulk_list_idle_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hub_url: String::new(),
            dialect: Dialect::default(),
            search: SearchIntervalConfig::default(),
            keepalive_interval_ms: DEFAULT_KEEPALIVE_INTERVAL_MS,
            bulk_list_idle_ms: 5_000,
        }
    }
}

impl SessionConfig {
    /// Create a configuration for the given hub, deriving the dialect from
    /// its address scheme when possible
    pub fn for_hub<T: Into<String>>(hub_url: T) -> Self {
        let hub_url = hub_url.into();
        let dialect = Dialect::from_url(&hub_url).unwrap_or_default();
        Self {
            hub_url,
            dialect,
            ..Self::default()
        }
    }

    /// Configuration for tests: no throttling, no keep-alive, quick list
    /// inactivity
    pub fn testing() -> Self {
        Self {
            hub_url: "adc://127.0.0.1:411".to_string(),
            dialect: Dialect::Adc,
            search: SearchIntervalConfig::unthrottled(),
            keepalive_interval_ms: 0,
            bulk_list_idle_ms: 100,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.search.validate()?;
        if !self.hub_url.is_empty() && Dialect::from_url(&self.hub_url).is_none() {
            return Err(ConfigError::Invalid {
                reason: format!("unrecognized hub address scheme in {}", self.hub_url),
            });
        }
        Ok(())
    }
}
