//! Hub session CLI library
//!
//! Configuration loading, script replay and command handlers for the
//! `hubsession` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod replay;

pub use cli::{Cli, Commands, FeatureKind};
pub use config::AppConfig;
pub use error::{CliError, Result};
pub use replay::{ReplaySummary, Replayer, ScriptStep};
