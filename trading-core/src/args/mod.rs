//! Command-line arguments of the engine binary.
//!
//! Everything that describes *what* to trade lives in the configuration
//! file; the command line only says where that file and the runtime state
//! live, and how chatty the logs should be.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct EngineArgs {
    /// Path to the engine configuration file (TOML, JSON or YAML)
    #[arg(short, long, default_value = "config/engine.toml")]
    config: PathBuf,

    /// Directory for runtime state (overrides `engine.data_dir`)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Default log filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Starting equity of each paper account
    #[arg(long, default_value_t = 100_000.0)]
    paper_equity: f64,
}

impl EngineArgs {
    /// Parses arguments from an explicit iterator (tests, embedding).
    pub fn parse_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        EngineArgs::parse_from(args)
    }

    pub fn get_config_path(&self) -> PathBuf {
        self.config.clone()
    }

    pub fn get_data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone()
    }

    pub fn get_log_level(&self) -> &str {
        &self.log_level
    }

    pub fn get_paper_equity(&self) -> f64 {
        self.paper_equity
    }
}
