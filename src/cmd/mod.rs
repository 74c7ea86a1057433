//! CLI command handlers

use clap::Subcommand;

pub mod config_check;
pub mod diagnostics;
pub mod root;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the worker (default when no subcommand is given)
    Run,
    /// Validate configuration and report resolved values
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run diagnostics and display system information
    Diagnostics,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Load configuration through the full priority chain and report it
    Check,
}
