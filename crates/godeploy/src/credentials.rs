//! # Credential storage
//!
//! Credentials live in a single JSON file in the user's config directory.
//! Nothing is cached in memory: every getter reads the file and every mutator
//! performs a full load-mutate-save cycle, so the file stays the only source of
//! truth across process runs.
//!
//! Writes go through a temporary file in the same directory which is then
//! renamed over the target, so both tokens always land together.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};
use tempfile::{NamedTempFile, PersistError};

/// Permission bits of the credential directory.
#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

/// Permission bits of the credential file.
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Credential storage errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum CredentialError {
    /// IO-related error.
    Io(io::Error),

    /// Credential file contains malformed JSON.
    #[display(fmt = "unable to parse credential file: {}", _0)]
    Json(serde_json::Error),

    /// Unable to move the temporary file over the credential file.
    Persist(PersistError),
}

/// Stored user credentials.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Credential {
    /// Short-lived bearer token.
    #[serde(rename = "auth_token", default)]
    pub access_token: String,

    /// Long-lived token used to obtain new access tokens.
    #[serde(default)]
    pub refresh_token: String,

    /// Email remembered for the next login.
    #[serde(default)]
    pub email: String,
}

/// File-backed credential store.
pub(crate) struct CredentialStore {
    /// Credential file location.
    path: PathBuf,

    /// Credential file location used by older releases.
    legacy_path: Option<PathBuf>,
}

impl CredentialStore {
    /// Create a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            legacy_path: None,
        }
    }

    /// Copy credentials from `legacy_path` on first use if the store file does not exist yet.
    pub fn with_legacy_path(mut self, legacy_path: impl Into<PathBuf>) -> Self {
        self.legacy_path = Some(legacy_path.into());
        self
    }

    /// Credential file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load credentials, returning empty ones if the file does not exist.
    pub fn load(&self) -> Result<Credential, CredentialError> {
        if let Err(error) = self.migrate_legacy() {
            tracing::warn!(%error, "unable to migrate credentials from legacy location");
        }

        match fs::read(&self.path) {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Credential::default()),
            Err(error) => Err(error.into()),
        }
    }

    /// Persist credentials, creating the parent directory if needed.
    pub fn save(&self, credential: &Credential) -> Result<(), CredentialError> {
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        create_dir(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(file.as_file_mut(), credential)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            file.as_file()
                .set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
        }

        file.persist(&self.path)?;

        Ok(())
    }

    /// Stored access token, empty if absent.
    pub fn auth_token(&self) -> Result<String, CredentialError> {
        Ok(self.load()?.access_token)
    }

    /// Stored refresh token, empty if absent.
    pub fn refresh_token(&self) -> Result<String, CredentialError> {
        Ok(self.load()?.refresh_token)
    }

    /// Remembered email, empty if absent.
    pub fn user_email(&self) -> Result<String, CredentialError> {
        Ok(self.load()?.email)
    }

    /// Whether an access token is stored. The token is not verified.
    pub fn is_authenticated(&self) -> Result<bool, CredentialError> {
        Ok(!self.auth_token()?.is_empty())
    }

    /// Replace both tokens in a single write.
    pub fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), CredentialError> {
        self.update(|credential| {
            credential.access_token = access_token.to_owned();
            credential.refresh_token = refresh_token.to_owned();
        })
    }

    /// Replace the access token only.
    pub fn set_auth_token(&self, access_token: &str) -> Result<(), CredentialError> {
        self.update(|credential| credential.access_token = access_token.to_owned())
    }

    /// Replace the saved email.
    pub fn set_user_email(&self, email: &str) -> Result<(), CredentialError> {
        self.update(|credential| credential.email = email.to_owned())
    }

    /// Forget both tokens while keeping the email for the next login.
    pub fn clear_auth_token(&self) -> Result<(), CredentialError> {
        self.update(|credential| {
            credential.access_token.clear();
            credential.refresh_token.clear();
        })
    }

    /// Load-mutate-save helper.
    fn update(&self, mutate: impl FnOnce(&mut Credential)) -> Result<(), CredentialError> {
        let mut credential = self.load()?;
        mutate(&mut credential);
        self.save(&credential)
    }

    /// Copy the legacy credential file into place. The legacy file is left untouched.
    fn migrate_legacy(&self) -> io::Result<()> {
        let Some(legacy_path) = &self.legacy_path else {
            return Ok(());
        };

        if legacy_path == &self.path || self.path.exists() || !legacy_path.is_file() {
            return Ok(());
        }

        if let Some(dir) = self.path.parent() {
            create_dir(dir)?;
        }

        fs::copy(legacy_path, &self.path)?;
        tracing::info!(from = %legacy_path.display(), to = %self.path.display(), "migrated credentials");

        Ok(())
    }
}

/// Recursively create `dir` with the credential directory permissions.
fn create_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;

        fs::DirBuilder::new().recursive(true).mode(DIR_MODE).create(dir)
    }

    #[cfg(not(unix))]
    {
        fs::create_dir_all(dir)
    }
}
