//! Sonic Engine - playback engine for Subsonic music clients.
//!
//! The engine owns the play queue and drives an opaque audio backend:
//! gapless preloading, shuffle and loop modes, scrobbling and ReplayGain.
//! The binary exposes CLI commands for checking a server setup.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod player;
pub mod saved_queue;
pub mod server;
#[cfg(test)]
pub mod test_utils;

use clap::{CommandFactory, Parser};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Engine components log under short targets rather than the crate path.
const DEFAULT_LOG_FILTER: &str =
    "sonic_engine=info,engine=info,manager=info,cache=info,config=info,subsonic=info";

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging. RUST_LOG replaces the defaults entirely.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    if !cli::run_command(&args)? {
        cli::Cli::command().print_help()?;
    }
    Ok(())
}
