use std::{fs, path::PathBuf};

use derive_more::{Display, Error, From};

use crate::{
    api::{ApiClient, ApiError, DeployUpload},
    archiver::{build_zip_archive, ArchiveStats, ArchiverError},
    cache::{CacheError, DeploymentCache},
    commit::{self, CommitMetadata, MetadataProvider},
    config::{App, ConfigError, SpaConfig, DEFAULT_CONFIG_FILE},
    reporter::Reporter,
    token::{TokenError, TokenManager},
};

/// Deployment pipeline errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum DeployError {
    /// No usable credentials.
    #[display(fmt = "not authenticated ({}). {}", reason, hint)]
    #[from(ignore)]
    NotAuthenticated {
        /// What is missing.
        reason: String,

        /// Remediation hint.
        hint: String,
    },

    /// The access token expired and could not be refreshed.
    #[display(fmt = "authentication expired: {}. {}", source, hint)]
    #[from(ignore)]
    TokenRefreshFailed {
        /// Refresh failure.
        source: TokenError,

        /// Remediation hint.
        hint: String,
    },

    /// The SPA configuration could not be read or is invalid.
    #[display(fmt = "failed to load config from {}: {}", path, source)]
    #[from(ignore)]
    ConfigLoadFailed {
        /// Configuration file path.
        path: String,

        /// Load failure.
        source: ConfigError,
    },

    /// No project was named and none is enabled.
    #[display(fmt = "no enabled projects found in configuration")]
    NoEnabledProjects,

    /// The named project is not in the configuration.
    #[display(fmt = "project '{}' not found in configuration", name)]
    #[from(ignore)]
    ProjectNotFound {
        /// Requested project name.
        name: String,
    },

    /// The named project exists but is disabled.
    #[display(fmt = "project '{}' is disabled in configuration", name)]
    #[from(ignore)]
    ProjectDisabled {
        /// Requested project name.
        name: String,
    },

    /// Build output directory does not exist.
    #[display(fmt = "source directory {} of project '{}' does not exist", path, project)]
    #[from(ignore)]
    SourceDirMissing {
        /// Project name.
        project: String,

        /// Resolved source directory.
        path: String,
    },

    /// Deployment cache error.
    Cache(CacheError),

    /// Archive creation failed.
    #[display(fmt = "failed to create archive: {}", _0)]
    ArchiveBuildFailed(ArchiverError),

    /// The service rejected the upload or could not be reached.
    #[display(fmt = "deployment failed: {}", _0)]
    UploadFailed(ApiError),

    /// The upload timed out; the server may still finish the deployment.
    #[display(
        fmt = "request timed out waiting for server response; your deployment may still complete. \
               Consider increasing the timeout via GODEPLOY_DEPLOY_TIMEOUT"
    )]
    #[from(ignore)]
    UploadTimedOutAmbiguous {
        /// Underlying timeout.
        source: ApiError,
    },
}

/// Deployment request.
#[derive(Debug, Default)]
pub(crate) struct DeployOptions {
    /// Project to deploy. The first enabled app is used when absent.
    pub project: Option<String>,

    /// SPA configuration file.
    pub config_path: PathBuf,

    /// Directory relative source directories are resolved against.
    pub working_dir: PathBuf,

    /// Explicit commit metadata, taking precedence over VCS lookups.
    pub overrides: CommitMetadata,

    /// Use only `overrides`, never query the VCS.
    pub no_git: bool,

    /// Ask the server to invalidate its CDN cache.
    pub clear_cache: bool,
}

/// Successful deployment.
#[derive(Debug)]
pub(crate) struct DeployOutcome {
    /// Deployed URL.
    pub url: String,

    /// Deployed project name.
    pub project: String,

    /// Uploaded archive statistics.
    pub stats: ArchiveStats,

    /// Metadata sent with the upload.
    pub commit: CommitMetadata,
}

/// Deployment pipeline over injected capabilities.
pub(crate) struct Deployer<'a> {
    /// Access token source.
    pub tokens: &'a TokenManager<'a>,

    /// Deployment service.
    pub api: &'a dyn ApiClient,

    /// Commit metadata source.
    pub vcs: &'a dyn MetadataProvider,

    /// Where archives are built.
    pub cache: &'a DeploymentCache,

    /// Progress output.
    pub reporter: &'a dyn Reporter,
}

impl Deployer<'_> {
    /// Run the whole pipeline: authenticate, validate, archive, upload.
    ///
    /// Authentication and configuration problems are reported before anything
    /// touches the cache or the network. The cache entry holding the archive is
    /// removed on every return path.
    pub fn deploy(&self, options: &DeployOptions) -> Result<DeployOutcome, DeployError> {
        self.reporter.step("Checking authentication...");

        let access_token = self
            .tokens
            .ensure_valid_token()
            .map_err(|error| self.authentication_error(error))?;

        self.reporter.step("Loading configuration...");

        let config_error = |source: ConfigError| DeployError::ConfigLoadFailed {
            path: options.config_path.display().to_string(),
            source,
        };

        let spa_config = fs::read(&options.config_path).map_err(|error| config_error(error.into()))?;
        let config = SpaConfig::from_slice(&spa_config).map_err(config_error)?;

        let app = select_app(&config, options.project.as_deref())?;

        let source_dir = options.working_dir.join(&app.source_dir);

        if !source_dir.is_dir() {
            return Err(DeployError::SourceDirMissing {
                project: app.name.clone(),
                path: source_dir.display().to_string(),
            });
        }

        tracing::info!(
            project = %app.name,
            description = %app.description,
            path = %app.path,
            source_dir = %source_dir.display(),
            "deploying"
        );

        let entry = self.cache.allocate(&app.name)?;
        let archive_path = entry.path().join(format!("{}.zip", entry.project_name()));

        tracing::debug!(path = %entry.path().display(), created_at = %entry.created_at(), "cache entry ready");

        self.reporter.step("Creating archive...");

        let stats = build_zip_archive(&source_dir, &archive_path)
            .map_err(DeployError::ArchiveBuildFailed)?;

        let commit = if options.no_git {
            options.overrides.clone()
        } else {
            self.reporter.step("Reading commit metadata...");
            commit::resolve(self.vcs, &options.overrides)
        };

        if commit.sha.is_empty() && !options.no_git {
            self.reporter
                .note("No commit information found, deploying without it.");
        }

        let upload = DeployUpload {
            project: app.name.clone(),
            config_file_name: options
                .config_path
                .file_name()
                .map_or_else(|| DEFAULT_CONFIG_FILE.to_owned(), |name| name.to_string_lossy().into_owned()),
            spa_config,
            archive_path,
            commit,
            clear_cache: options.clear_cache,
        };

        self.reporter.step("Uploading...");

        let url = self
            .api
            .deploy(&access_token, &upload)
            .map_err(|error| {
                tracing::error!(project = %upload.project, %error, "upload failed");

                if error.is_timeout() {
                    DeployError::UploadTimedOutAmbiguous { source: error }
                } else {
                    DeployError::UploadFailed(error)
                }
            })?;

        tracing::info!(project = %upload.project, %url, "deployment succeeded");

        drop(entry);

        Ok(DeployOutcome {
            url,
            project: upload.project,
            stats,
            commit: upload.commit,
        })
    }

    /// Classify a token failure, attaching the login hint.
    fn authentication_error(&self, error: TokenError) -> DeployError {
        let email = self.tokens.store().user_email().unwrap_or_default();
        let hint = login_hint(&email);

        match error {
            TokenError::RefreshFailed(_) => DeployError::TokenRefreshFailed {
                source: error,
                hint,
            },
            error => DeployError::NotAuthenticated {
                reason: error.to_string(),
                hint,
            },
        }
    }
}

/// Remediation hint for authentication failures.
pub(crate) fn login_hint(email: &str) -> String {
    if email.is_empty() {
        String::from("Run 'godeploy auth login' to authenticate")
    } else {
        format!("Run 'godeploy auth login' to authenticate with saved email: {email}")
    }
}

/// Pick the named app, or the first enabled one when no name is given.
fn select_app<'c>(config: &'c SpaConfig, name: Option<&str>) -> Result<&'c App, DeployError> {
    let Some(name) = name.filter(|name| !name.is_empty()) else {
        return config
            .enabled_apps()
            .next()
            .ok_or(DeployError::NoEnabledProjects);
    };

    let app = config
        .app_by_name(name)
        .ok_or_else(|| DeployError::ProjectNotFound {
            name: name.to_owned(),
        })?;

    if !app.enabled {
        return Err(DeployError::ProjectDisabled {
            name: name.to_owned(),
        });
    }

    Ok(app)
}
