//! CLI command definitions and dispatch.
//!
//! Each subcommand group is implemented in its own submodule:
//! - `config`: Inspect and create the config file
//! - `server`: Talk to the configured Subsonic server
//! - `queue`: Inspect the saved play queue

mod config;
mod queue;
mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use crate::error::ResultExt;

pub use config::{cmd_config_init, cmd_config_path, cmd_config_show};
pub use queue::cmd_queue_show;
pub use server::{cmd_ping, cmd_scrobble, cmd_stream_url};

/// Sonic Engine CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "SONIC_ENGINE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Check the server connection and credentials
    Ping,
    /// Print the stream URL for a track
    StreamUrl {
        /// Track ID
        id: String,
        /// Request the original file, ignoring transcoding settings
        #[arg(long)]
        raw: bool,
    },
    /// Report tracks as played (or now playing)
    Scrobble {
        /// Track IDs
        #[arg(required = true)]
        ids: Vec<String>,
        /// Count a play instead of marking as now playing
        #[arg(long)]
        submission: bool,
    },
    /// Saved play queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum QueueAction {
    /// Print the saved play queue
    Show {
        /// Saved queue file (defaults to the one next to the config)
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

/// Run the specified CLI command.
///
/// Returns `Ok(true)` if a command was run, `Ok(false)` if no command was
/// specified.
pub fn run_command(cli: &Cli) -> anyhow::Result<bool> {
    let config_path = cli.config.as_deref();

    match &cli.command {
        Some(Commands::Config { action }) => {
            match action {
                ConfigAction::Show => cmd_config_show(config_path)?,
                ConfigAction::Path => cmd_config_path(config_path)?,
                ConfigAction::Init { force } => cmd_config_init(config_path, *force)?,
            }
            Ok(true)
        }
        Some(Commands::Ping) => {
            let rt = Runtime::new()?;
            cmd_ping(&rt, config_path)?;
            Ok(true)
        }
        Some(Commands::StreamUrl { id, raw }) => {
            cmd_stream_url(config_path, id, *raw)?;
            Ok(true)
        }
        Some(Commands::Scrobble { ids, submission }) => {
            let rt = Runtime::new()?;
            cmd_scrobble(&rt, config_path, ids, *submission)?;
            Ok(true)
        }
        Some(Commands::Queue { action }) => {
            match action {
                QueueAction::Show { file } => cmd_queue_show(file.as_deref())?,
            }
            Ok(true)
        }
        None => Ok(false),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Load the config from an explicit path or the default location
pub(crate) fn load_config(path: Option<&std::path::Path>) -> crate::config::Config {
    match path {
        Some(path) => crate::config::load_from(path),
        None => crate::config::load(),
    }
}

/// Build a client for the configured server
pub(crate) fn connect(
    config: &crate::config::Config,
) -> anyhow::Result<crate::server::subsonic::SubsonicClient> {
    let server = &config.server;
    if !server.is_configured() {
        anyhow::bail!(
            "No server configured. Set [server] url and username in the config file \
             (see `sonic-engine config path`)."
        );
    }
    let client = crate::server::subsonic::SubsonicClient::new(
        server.url.clone(),
        server.username.clone(),
        server.password.clone(),
    )
    .with_context(format!("Connecting to {}", server.url))?;
    Ok(client)
}
