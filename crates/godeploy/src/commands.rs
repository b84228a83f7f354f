/// `auth` subcommand.
mod auth;

/// `deploy` subcommand.
mod deploy;

/// `init` subcommand.
mod init;

/// `version` subcommand.
mod version;

pub(crate) use auth::auth;
pub(crate) use deploy::deploy;
pub(crate) use init::init;
pub(crate) use version::version;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use common::paths::Paths;

use crate::{config::DEFAULT_CONFIG_FILE, credentials::CredentialStore};

/// CLI configuration.
#[derive(Parser)]
#[command(about, version)]
pub(crate) struct Cli {
    /// SPA configuration file path.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Selected subcommand.
    #[command(subcommand)]
    pub command: Commands,
}

/// Supported subcommands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Create a starter SPA configuration file.
    Init(Init),

    /// Manage authentication with the deployment service.
    Auth(Auth),

    /// Archive and deploy an SPA.
    Deploy(Deploy),

    /// Print the CLI version.
    Version,
}

/// `init` subcommand configuration.
#[derive(Args)]
pub struct Init {
    /// Overwrite an existing configuration file.
    #[arg(short, long)]
    force: bool,
}

/// `auth` subcommand configuration.
#[derive(Args)]
pub struct Auth {
    /// Selected authentication action.
    #[command(subcommand)]
    command: AuthCommands,
}

/// Authentication actions.
#[derive(Subcommand)]
pub(crate) enum AuthCommands {
    /// Sign in with an existing account.
    Login(Credentials),

    /// Create a new account.
    Signup(Credentials),

    /// Show whether a valid session exists.
    Status,

    /// Forget the stored tokens. The email is kept for the next login.
    Logout,
}

/// Account credentials; missing values are prompted for.
#[derive(Args)]
pub struct Credentials {
    /// Account email.
    #[arg(short, long)]
    email: Option<String>,

    /// Account password.
    #[arg(short, long)]
    password: Option<String>,
}

/// `deploy` subcommand configuration.
#[derive(Args)]
pub struct Deploy {
    /// Project to deploy. Defaults to the first enabled app.
    #[arg(short, long)]
    project: Option<String>,

    /// Commit SHA, instead of the current git HEAD.
    #[arg(long)]
    commit_sha: Option<String>,

    /// Commit branch, instead of the current git branch.
    #[arg(long)]
    commit_branch: Option<String>,

    /// Commit message, instead of the last git commit message.
    #[arg(long)]
    commit_message: Option<String>,

    /// Commit link, instead of one derived from the git remote.
    #[arg(long)]
    commit_url: Option<String>,

    /// Do not read commit metadata from git.
    #[arg(long)]
    no_git: bool,

    /// Invalidate the CDN cache after deploying.
    #[arg(long)]
    clear_cache: bool,
}

/// Credential store at the user's config directory.
fn credential_store(paths: &Paths) -> CredentialStore {
    CredentialStore::new(paths.credentials_file()).with_legacy_path(paths.legacy_credentials_file())
}
