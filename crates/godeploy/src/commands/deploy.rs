use std::{io, path::Path, time::Duration};

use byte_unit::Byte;
use common::{config::Settings, paths::Paths};
use derive_more::{Display, Error, From};

use crate::{
    api::{ApiClient, ApiError, HttpApiClient},
    archiver::ArchiveStats,
    cache::DeploymentCache,
    commands::{credential_store, Deploy},
    commit::{CommitMetadata, GitCli, MetadataProvider, Unavailable},
    process::{DeployError, DeployOptions, DeployOutcome, Deployer},
    reporter::{Reporter, SpinnerReporter},
    token::TokenManager,
};

/// Cache entries older than this are left over from interrupted runs.
const STALE_CACHE_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// `deploy` subcommand errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum DeployCommandError {
    /// Unable to set up the API client.
    Api(ApiError),

    /// Unable to determine the working directory.
    Io(io::Error),

    /// Deployment pipeline error.
    Deploy(DeployError),
}

/// Deployment flow entrypoint.
pub(crate) fn deploy(
    Deploy {
        project,
        commit_sha,
        commit_branch,
        commit_message,
        commit_url,
        no_git,
        clear_cache,
    }: Deploy,
    config_path: &Path,
    paths: &Paths,
    settings: &Settings,
) -> Result<(), DeployCommandError> {
    let api = HttpApiClient::new(
        &settings.api_url,
        settings.request_timeout(),
        settings.upload_timeout(),
    )?;
    let tokens = TokenManager::new(credential_store(paths), |token| api.refresh_token(token));

    let cache = DeploymentCache::new(paths.deploy_cache_dir());

    match cache.remove_stale(STALE_CACHE_AGE) {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "removed stale deployment cache entries"),
        Err(error) => tracing::warn!(%error, "unable to sweep deployment cache"),
    }

    let vcs: Box<dyn MetadataProvider> = match GitCli::locate() {
        Ok(git) => Box::new(git),
        Err(error) => {
            tracing::debug!(%error, "git unavailable, commit metadata limited to flags");
            Box::new(Unavailable)
        }
    };

    let options = DeployOptions {
        project,
        config_path: config_path.to_path_buf(),
        working_dir: std::env::current_dir()?,
        overrides: CommitMetadata {
            sha: commit_sha.unwrap_or_default(),
            branch: commit_branch.unwrap_or_default(),
            message: commit_message.unwrap_or_default(),
            url: commit_url.unwrap_or_default(),
        },
        no_git,
        clear_cache,
    };

    let reporter = SpinnerReporter::new();

    let deployer = Deployer {
        tokens: &tokens,
        api: &api,
        vcs: vcs.as_ref(),
        cache: &cache,
        reporter: &reporter,
    };

    let outcome = match deployer.deploy(&options) {
        Ok(outcome) => outcome,
        Err(error) => {
            reporter.finish("Deployment failed.");
            return Err(error.into());
        }
    };

    reporter.finish("Deployment completed.");

    print_summary(&outcome);

    Ok(())
}

/// Print archive statistics, commit details and the deployed URL.
fn print_summary(outcome: &DeployOutcome) {
    println!("{}", archive_summary(&outcome.stats));

    let commit = &outcome.commit;

    if !commit.sha.is_empty() {
        let branch = if commit.branch.is_empty() {
            String::new()
        } else {
            format!(" ({})", commit.branch)
        };

        println!("Commit: {}{branch}", short_sha(&commit.sha));
    }

    if !commit.url.is_empty() {
        println!("Commit URL: {}", commit.url);
    }

    println!("Project '{}' deployed to {}", outcome.project, outcome.url);
}

/// One-line human-readable archive statistics.
fn archive_summary(stats: &ArchiveStats) -> String {
    format!(
        "Archived {} files: {} -> {} ({:.1}%) in {:.2}s",
        stats.file_count,
        human_size(stats.total_size),
        human_size(stats.compressed_size),
        stats.compression_ratio,
        stats.duration.as_secs_f64(),
    )
}

/// Size with a binary unit, e.g. `5.86 KiB`.
fn human_size(bytes: u64) -> String {
    Byte::from_bytes(bytes.into())
        .get_appropriate_unit(true)
        .to_string()
}

/// First seven characters of a commit SHA.
fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
