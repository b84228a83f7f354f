use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

#[cfg(feature = "logging")]
use tracing_subscriber::filter::LevelFilter;

use crate::paths::Paths;

/// Implementation of [`serde`]'s deserializer for [`FromStr`] types.
///
/// [`FromStr`]: std::str::FromStr
#[cfg(feature = "logging")]
fn deserialize_from_str<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error,
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    std::str::FromStr::from_str(&s).map_err(serde::de::Error::custom)
}

/// CLI settings.
#[derive(Deserialize)]
pub struct Settings {
    /// Base URL of the deployment API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Timeout applied to regular API requests, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Timeout applied to the deploy upload, in seconds.
    #[serde(default = "default_timeout")]
    pub deploy_timeout: u64,

    /// Log file verbosity. `off` disables file logging.
    #[cfg(feature = "logging")]
    #[serde(
        default = "default_log_level",
        deserialize_with = "deserialize_from_str"
    )]
    pub log_level: LevelFilter,
}

/// Production API endpoint.
fn default_api_url() -> String {
    String::from("https://api.godeploy.app")
}

/// Request timeout in seconds.
fn default_timeout() -> u64 {
    30
}

#[cfg(feature = "logging")]
/// Log level when none is configured.
fn default_log_level() -> LevelFilter {
    LevelFilter::INFO
}

impl Settings {
    /// Load settings from the user's settings file and `GODEPLOY_`-prefixed
    /// environment variables, the latter taking precedence.
    ///
    /// See [`Env`] for more details on how to use environment variables configuration.
    ///
    /// [`Env`]: figment::providers::Env
    pub fn new(paths: &Paths) -> Result<Self, figment::Error> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(paths.settings_file()))
                .merge(Env::prefixed("GODEPLOY_")),
        )
    }

    /// Extract settings from an arbitrary provider stack.
    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }

    /// Regular API request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Deploy upload timeout.
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy_timeout)
    }
}
