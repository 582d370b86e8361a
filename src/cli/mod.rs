//! Command-line interface for sonic-engine.
//!
//! This module provides CLI commands for checking the server connection,
//! building stream URLs, scrobbling and inspecting the saved play queue.

mod commands;

pub use commands::{Cli, Commands, run_command};
