//! koji-adjutant - containerized Koji build-task worker
//!
//! Executes Koji-style build tasks (buildArch, rebuildSRPM, buildSRPMFromSCM,
//! createrepo) inside OCI containers driven by a local container engine, in
//! place of a chroot/VM-based worker.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use koji_adjutant::config::{ConfigOptions, Configuration, LogFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "adjutant")]
#[command(about = "Containerized Koji build-task worker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<cmd::Commands>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_format = Configuration::load_layered(cli.config.as_deref().map(std::path::Path::new), &ConfigOptions::default())
        .map(|c| c.log_format)
        .unwrap_or_default();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if cli.debug { "debug" } else { "info" };
        format!("koji_adjutant={}", level).into()
    });

    match log_format {
        LogFormat::Json => {
            tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
        }
    }

    info!("Starting koji-adjutant v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd::Commands::Config { action }) => match action {
            cmd::ConfigAction::Check => cmd::config_check::run(cli.config.as_deref()).await?,
        },
        Some(cmd::Commands::Diagnostics) => {
            cmd::diagnostics::run().await?;
        }
        Some(cmd::Commands::Run) | None => {
            if let Err(e) = cmd::root::run(cli.config.as_deref()).await {
                error!("worker error: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
