use std::io;

use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};

/// Default SPA configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "godeploy.config.json";

/// Starter configuration written by `godeploy init`.
pub const STARTER_CONFIG: &str = r#"{
  "apps": [
    {
      "name": "yourAppName",
      "source_dir": "dist",
      "description": "Your application description",
      "enabled": true
    }
  ]
}
"#;

/// SPA configuration errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum ConfigError {
    /// IO-related error.
    #[display(fmt = "failed to read config file: {}", _0)]
    Io(io::Error),

    /// Malformed JSON.
    #[display(fmt = "failed to parse config file: {}", _0)]
    Json(serde_json::Error),

    /// The `apps` array is empty.
    #[display(fmt = "at least one app must be defined in the configuration")]
    NoApps,

    /// An app without a name.
    #[display(fmt = "app #{} has an empty name", index)]
    #[from(ignore)]
    MissingName {
        /// Position in the `apps` array, starting from 1.
        index: usize,
    },
}

/// Multi-SPA configuration file.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SpaConfig {
    /// Configured applications.
    pub apps: Vec<App>,
}

/// A single SPA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct App {
    /// Project name used on the deployment service.
    pub name: String,

    /// Build output directory, relative to the working directory unless absolute.
    pub source_dir: String,

    /// URL path the app is served under. Defaults to the app name.
    #[serde(default)]
    pub path: String,

    /// Free-form description, logged on deploy.
    #[serde(default)]
    pub description: String,

    /// Only enabled apps can be deployed.
    #[serde(default)]
    pub enabled: bool,
}

impl SpaConfig {
    /// Parse and validate configuration bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, ConfigError> {
        let mut config: SpaConfig = serde_json::from_slice(data)?;

        if config.apps.is_empty() {
            return Err(ConfigError::NoApps);
        }

        for (index, app) in config.apps.iter_mut().enumerate() {
            if app.name.trim().is_empty() {
                return Err(ConfigError::MissingName { index: index + 1 });
            }

            if app.path.is_empty() {
                tracing::debug!(app = %app.name, "defaulting app path to its name");
                app.path = app.name.clone();
            }
        }

        Ok(config)
    }

    /// Enabled apps, in file order.
    pub fn enabled_apps(&self) -> impl Iterator<Item = &App> {
        self.apps.iter().filter(|app| app.enabled)
    }

    /// Look up an app by its exact name.
    pub fn app_by_name(&self, name: &str) -> Option<&App> {
        self.apps.iter().find(|app| app.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, SpaConfig, STARTER_CONFIG};

    #[test]
    fn parses_apps_and_defaults_path() {
        let config = SpaConfig::from_slice(
            br#"{"apps": [
                {"name": "auth", "source_dir": "apps/auth/dist", "path": "login", "enabled": false},
                {"name": "home", "source_dir": "dist", "description": "Landing", "enabled": true}
            ]}"#,
        )
        .unwrap();

        assert_eq!(config.apps.len(), 2);
        assert_eq!(config.apps[0].path, "login");
        assert_eq!(config.apps[1].path, "home");
        assert_eq!(config.enabled_apps().next().unwrap().name, "home");
        assert!(config.app_by_name("auth").is_some());
        assert!(config.app_by_name("Auth").is_none());
    }

    #[test]
    fn rejects_empty_app_list() {
        assert!(matches!(
            SpaConfig::from_slice(br#"{"apps": []}"#),
            Err(ConfigError::NoApps)
        ));
        assert!(matches!(
            SpaConfig::from_slice(b"{"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn rejects_unnamed_app() {
        assert!(matches!(
            SpaConfig::from_slice(br#"{"apps": [{"name": " ", "source_dir": "dist"}]}"#),
            Err(ConfigError::MissingName { index: 1 })
        ));
    }

    #[test]
    fn starter_config_is_valid() {
        let config = SpaConfig::from_slice(STARTER_CONFIG.as_bytes()).unwrap();

        assert_eq!(config.enabled_apps().count(), 1);
    }
}
