//! Per-user directory layout.
//!
//! ```text
//! $XDG_CONFIG_HOME/godeploy/       credentials, settings
//! $XDG_CACHE_HOME/godeploy/deploys deployment scratch directories
//! $XDG_STATE_HOME/godeploy/logs    log files
//! ```
//!
//! Unset, empty or relative `XDG_*` variables fall back to the usual
//! locations under the home directory.

use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
};

use derive_more::{Display, Error};

/// Application identifier used in every directory name.
pub const APP_NAME: &str = "godeploy";

/// Errors that may occur while resolving user directories.
#[derive(Debug, Display, Error)]
pub enum PathsError {
    /// User's home directory cannot be determined.
    #[display(fmt = "unable to find home directory")]
    HomeDirNotFound,
}

/// Resolved application directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Config directory (credentials, settings).
    pub config_dir: PathBuf,

    /// Cache directory (deployment scratch space).
    pub cache_dir: PathBuf,

    /// State directory (logs).
    pub state_dir: PathBuf,

    /// Pre-XDG config directory, kept for credential migration.
    pub legacy_config_dir: PathBuf,
}

impl Paths {
    /// Resolve directories from the process environment.
    pub fn from_env() -> Result<Self, PathsError> {
        let home = home::home_dir().ok_or(PathsError::HomeDirNotFound)?;
        Ok(Self::resolve(&home, |key| env::var_os(key)))
    }

    /// Resolve directories relative to `home`, reading `XDG_*` overrides through `lookup`.
    pub fn resolve(home: &Path, lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let base = |key: &str, fallback: &[&str]| {
            lookup(key)
                .map(PathBuf::from)
                .filter(|path| path.is_absolute())
                .unwrap_or_else(|| fallback.iter().fold(home.to_path_buf(), |acc, p| acc.join(p)))
                .join(APP_NAME)
        };

        Self {
            config_dir: base("XDG_CONFIG_HOME", &[".config"]),
            cache_dir: base("XDG_CACHE_HOME", &[".cache"]),
            state_dir: base("XDG_STATE_HOME", &[".local", "state"]),
            legacy_config_dir: home.join(".config").join(APP_NAME),
        }
    }

    /// Credential file location.
    pub fn credentials_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    /// Credential file location used before the XDG layout.
    pub fn legacy_credentials_file(&self) -> PathBuf {
        self.legacy_config_dir.join("config.json")
    }

    /// CLI settings file location.
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.toml")
    }

    /// Root of the deployment scratch directories.
    pub fn deploy_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("deploys")
    }

    /// Log file directory.
    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }
}
