use std::{fs, io, path::Path};

use derive_more::{Display, Error, From};

use crate::{commands::Init, config::STARTER_CONFIG};

/// `init` subcommand errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum InitError {
    /// IO-related error.
    Io(io::Error),

    /// Configuration file exists and `--force` was not given.
    #[display(fmt = "{} already exists, use --force to overwrite it", path)]
    #[from(ignore)]
    AlreadyExists {
        /// Existing file.
        path: String,
    },
}

/// Write a starter SPA configuration to `config_path`.
pub(crate) fn init(Init { force }: Init, config_path: &Path) -> Result<(), InitError> {
    write_starter_config(config_path, force)?;

    println!("Created {}", config_path.display());
    println!("Edit it to describe your apps, then run 'godeploy deploy'.");

    Ok(())
}

/// Write [`STARTER_CONFIG`], refusing to replace an existing file unless `force` is set.
fn write_starter_config(config_path: &Path, force: bool) -> Result<(), InitError> {
    if !force && config_path.exists() {
        return Err(InitError::AlreadyExists {
            path: config_path.display().to_string(),
        });
    }

    if let Some(parent) = config_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    fs::write(config_path, STARTER_CONFIG)?;

    tracing::info!(path = %config_path.display(), "starter config written");

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{write_starter_config, InitError};
    use crate::config::{SpaConfig, STARTER_CONFIG};

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("godeploy.config.json");

        fs::write(&path, "{}").unwrap();

        assert!(matches!(
            write_starter_config(&path, false),
            Err(InitError::AlreadyExists { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");

        write_starter_config(&path, true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), STARTER_CONFIG);
    }

    #[test]
    fn written_config_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/godeploy.config.json");

        write_starter_config(&path, false).unwrap();

        let config = SpaConfig::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(config.apps[0].name, "yourAppName");
    }
}
