pub mod config;
pub mod load_test;
pub mod monitor;
pub mod verify_capacity;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cs_domain::config::Config;
use cs_domain::error::Result;

/// CallScribe — a meeting-intelligence gateway.
#[derive(Debug, Parser)]
#[command(name = "callscribe", version, about)]
pub struct Cli {
    /// Path to the config file (default: ./callscribe.toml, or
    /// $CS_CONFIG).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Poll a running gateway's health and metrics.
    Monitor {
        /// Base URL of the gateway to probe.
        #[arg(long, default_value = "http://127.0.0.1:3420")]
        url: String,
        /// Probe once and exit instead of polling.
        #[arg(long)]
        once: bool,
        /// Seconds between probes.
        #[arg(long, default_value_t = 10)]
        interval: u64,
    },
    /// Drive simulated call sessions through the in-process pipeline.
    LoadTest {
        /// Number of concurrent sessions.
        #[arg(long, default_value_t = 10)]
        sessions: usize,
        /// Audio chunks pushed per session.
        #[arg(long, default_value_t = 20)]
        chunks: usize,
    },
    /// Check configuration headroom against a target session count.
    VerifyCapacity {
        /// Target number of concurrent call sessions.
        #[arg(long, default_value_t = 50)]
        target: usize,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Resolve the config path (flag > env > default) and load it.
pub fn load_config(flag: Option<&PathBuf>) -> Result<(Config, PathBuf)> {
    let path = flag
        .cloned()
        .or_else(|| std::env::var("CS_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("callscribe.toml"));
    let config = Config::load(&path)?;
    Ok((config, path))
}
