//! # Commit metadata
//!
//! Deployments carry optional provenance: commit SHA, branch, message and a
//! link to the commit. Every field can be set explicitly; any field left empty
//! is looked up through a [`MetadataProvider`], which in production runs
//! `git` in the current directory.
//!
//! Lookups are best-effort. A missing `git` binary, a directory outside of a
//! repository or any other failure leaves the field empty and never fails the
//! deployment.

use std::{
    io,
    path::PathBuf,
    process::{Command, Stdio},
};

use derive_more::{Display, Error, From};

/// The only hosting provider whose remotes produce commit links.
const GITHUB_HOST: &str = "github.com";

/// Commit metadata provider errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum ProviderError {
    /// Unable to locate the `git` binary.
    #[display(fmt = "unable to locate git: {}", _0)]
    Which(which::Error),

    /// IO-related error.
    Io(io::Error),

    /// Command exited unsuccessfully.
    #[display(fmt = "git {} exited with {}", command, status)]
    #[from(ignore)]
    Failed {
        /// Arguments passed to git.
        command: String,

        /// Exit status description.
        status: String,
    },
}

/// Source of VCS metadata.
pub(crate) trait MetadataProvider {
    /// Run a VCS query and return its raw output.
    fn query(&self, args: &[&str]) -> Result<String, ProviderError>;
}

/// [`MetadataProvider`] backed by the `git` command line.
pub(crate) struct GitCli {
    /// Resolved `git` binary.
    binary: PathBuf,
}

impl GitCli {
    /// Locate `git` on `PATH`.
    pub fn locate() -> Result<Self, ProviderError> {
        Ok(Self {
            binary: which::which("git")?,
        })
    }
}

impl MetadataProvider for GitCli {
    fn query(&self, args: &[&str]) -> Result<String, ProviderError> {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()?;

        if !output.status.success() {
            return Err(ProviderError::Failed {
                command: args.join(" "),
                status: output.status.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// [`MetadataProvider`] used when `git` is unavailable; every query fails.
pub(crate) struct Unavailable;

impl MetadataProvider for Unavailable {
    fn query(&self, args: &[&str]) -> Result<String, ProviderError> {
        Err(ProviderError::Failed {
            command: args.join(" "),
            status: String::from("git is not available"),
        })
    }
}

/// Commit metadata attached to a deployment. Empty strings mean unknown.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct CommitMetadata {
    /// Commit SHA.
    pub sha: String,

    /// Branch name, `HEAD` when detached.
    pub branch: String,

    /// Full commit message.
    pub message: String,

    /// Link to the commit on the hosting provider.
    pub url: String,
}

/// Resolve every field missing from `overrides` through `provider`.
pub(crate) fn resolve(provider: &dyn MetadataProvider, overrides: &CommitMetadata) -> CommitMetadata {
    let lookup = |explicit: &str, args: &[&str]| {
        if !explicit.is_empty() {
            return explicit.to_owned();
        }

        match provider.query(args) {
            Ok(output) => output.trim().to_owned(),
            Err(error) => {
                tracing::debug!(%error, "commit metadata lookup failed");
                String::new()
            }
        }
    };

    let sha = lookup(&overrides.sha, &["rev-parse", "HEAD"]);
    let branch = lookup(&overrides.branch, &["rev-parse", "--abbrev-ref", "HEAD"]);
    let message = lookup(&overrides.message, &["log", "-1", "--pretty=%B"]);

    let url = if overrides.url.is_empty() {
        commit_url(&lookup("", &["config", "--get", "remote.origin.url"]), &sha)
    } else {
        overrides.url.clone()
    };

    CommitMetadata {
        sha,
        branch,
        message,
        url,
    }
}

/// Build a GitHub commit link from a remote URL.
///
/// Recognises `git@github.com:org/repo(.git)`, `github.com/org/repo` and
/// `http(s)://github.com/org/repo(.git)`, with or without a trailing slash. Any other remote yields an empty string.
pub(crate) fn commit_url(remote: &str, sha: &str) -> String {
    if remote.is_empty() || sha.is_empty() || !remote.contains(GITHUB_HOST) {
        return String::new();
    }

    let mut url = match remote.split_once('@') {
        Some((user, rest)) if !user.contains('/') && rest.starts_with("github.com:") => {
            format!("https://github.com/{}", &rest["github.com:".len()..])
        }
        _ if remote.starts_with("github.com/") => format!("https://{remote}"),
        _ => remote.to_owned(),
    };

    url.truncate(url.trim_end_matches('/').len());

    if let Some(stripped) = url.strip_suffix(".git") {
        url.truncate(stripped.len());
    }

    if !(url.starts_with("https://github.com/") || url.starts_with("http://github.com/")) {
        return String::new();
    }

    format!("{url}/commit/{sha}")
}
