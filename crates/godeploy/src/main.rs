//! # godeploy
//!
//! Command-line client for the GoDeploy SPA hosting service.
//!
//! A deployment packages an app's build output into a ZIP archive inside a
//! per-run cache directory, attaches commit metadata and uploads everything
//! together with the SPA configuration file. The access token is refreshed
//! beforehand when it is about to expire.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

use clap::Parser;
use commands::{Cli, Commands};
use common::{config::Settings, logging, paths::Paths};

/// Deployment service API client.
mod api;

/// Build output archiving.
mod archiver;

/// Per-deployment scratch directories.
mod cache;

/// CLI subcommands.
mod commands;

/// VCS commit metadata.
mod commit;

/// SPA configuration file.
mod config;

/// Credential persistence.
mod credentials;

/// Deployment pipeline.
mod process;

/// Interactive progress output.
mod reporter;

/// Access token refresh.
mod token;

/// CLI entrypoint.
fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let paths = Paths::from_env()?;
    let settings = Settings::new(&paths)?;

    if let Err(error) = logging::init(&settings, &paths.log_dir()) {
        eprintln!("warning: file logging disabled: {error}");
    }

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting");

    match cli.command {
        Commands::Init(args) => commands::init(args, &cli.config)?,
        Commands::Auth(args) => commands::auth(args, &paths, &settings)?,
        Commands::Deploy(args) => commands::deploy(args, &cli.config, &paths, &settings)?,
        Commands::Version => commands::version(),
    }

    Ok(())
}
