use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use chrono::{DateTime, Local};
use derive_more::{Display, Error, From};
use rand::{
    distributions::{Alphanumeric, DistString},
    thread_rng,
};

/// Length of the random suffix appended to entry directory names.
const SUFFIX_LENGTH: usize = 6;

/// Number of names tried before giving up on allocation.
const MAX_ALLOCATION_ATTEMPTS: usize = 8;

/// Deployment cache errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum CacheError {
    /// IO-related error.
    #[display(fmt = "failed to prepare deployment cache directory: {}", _0)]
    Io(io::Error),

    /// Every generated entry name was already taken.
    #[display(fmt = "unable to allocate a unique deployment cache directory")]
    Exhausted,
}

/// Scratch space for deployment archives.
pub(crate) struct DeploymentCache {
    /// Directory that holds one subdirectory per deployment.
    root: PathBuf,
}

/// Deployment scratch directory, removed when dropped.
#[derive(Debug)]
pub(crate) struct CacheEntry {
    /// Entry directory.
    path: PathBuf,

    /// Project the entry was allocated for.
    project_name: String,

    /// Allocation time.
    created_at: DateTime<Local>,
}

impl DeploymentCache {
    /// Cache rooted at `root`. Nothing is created until the first allocation.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a fresh `{timestamp}-{project}-{suffix}` directory under the cache root.
    pub fn allocate(&self, project_name: &str) -> Result<CacheEntry, CacheError> {
        fs::create_dir_all(&self.root)?;

        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let created_at = Local::now();
            let name = format!(
                "{}-{}-{}",
                created_at.format("%Y%m%d-%H%M%S"),
                project_name,
                Alphanumeric
                    .sample_string(&mut thread_rng(), SUFFIX_LENGTH)
                    .to_lowercase(),
            );
            let path = self.root.join(name);

            match fs::create_dir(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "allocated deployment cache entry");

                    return Ok(CacheEntry {
                        path,
                        project_name: project_name.to_owned(),
                        created_at,
                    });
                }
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(error) => return Err(error.into()),
            }
        }

        Err(CacheError::Exhausted)
    }

    /// Remove entries last modified before `now - older_than`.
    ///
    /// Returns the number of removed entries. A missing cache root is not an error,
    /// and entries that fail to be removed are skipped.
    pub fn remove_stale(&self, older_than: Duration) -> Result<usize, CacheError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(error.into()),
        };

        let cutoff = SystemTime::now()
            .checked_sub(older_than)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut removed = 0;

        for entry in entries.filter_map(Result::ok) {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };

            if !metadata.is_dir() || metadata.modified().map_or(true, |time| time >= cutoff) {
                continue;
            }

            match release(&entry.path()) {
                Ok(()) => removed += 1,
                Err(error) => {
                    tracing::warn!(path = %entry.path().display(), %error, "unable to remove stale cache entry")
                }
            }
        }

        Ok(removed)
    }
}

impl CacheEntry {
    /// Entry directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Project the entry was allocated for.
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Allocation time.
    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }
}

impl Drop for CacheEntry {
    fn drop(&mut self) {
        if let Err(error) = release(&self.path) {
            tracing::warn!(path = %self.path.display(), %error, "unable to remove deployment cache entry");
        }
    }
}

/// Recursively delete `path`. Empty and missing paths are not errors.
pub(crate) fn release(path: &Path) -> io::Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::remove_dir_all(path) {
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path, time::Duration};

    use super::{release, DeploymentCache};

    #[test]
    fn allocate_creates_named_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DeploymentCache::new(dir.path().join("deploys"));

        let entry = cache.allocate("site").unwrap();
        let name = entry.path().file_name().unwrap().to_str().unwrap().to_owned();

        assert!(entry.path().is_dir());
        assert!(entry.path().starts_with(dir.path().join("deploys")));
        assert!(name.contains("-site-"));
        assert_eq!(entry.project_name(), "site");
        assert!(name.starts_with(&entry.created_at().format("%Y%m%d-%H%M%S").to_string()));
    }

    #[test]
    fn same_second_allocations_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DeploymentCache::new(dir.path());

        let first = cache.allocate("site").unwrap();
        let second = cache.allocate("site").unwrap();

        assert_ne!(first.path(), second.path());
        assert!(first.path().is_dir() && second.path().is_dir());
    }

    #[test]
    fn dropping_entry_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DeploymentCache::new(dir.path());

        let entry = cache.allocate("site").unwrap();
        let path = entry.path().to_path_buf();
        fs::write(path.join("site.zip"), b"partial").unwrap();

        drop(entry);

        assert!(!path.exists());
    }

    #[test]
    fn release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("entry");
        fs::create_dir_all(target.join("nested")).unwrap();

        release(&target).unwrap();
        release(&target).unwrap();
        release(Path::new("")).unwrap();
        release(&dir.path().join("never-existed")).unwrap();

        assert!(!target.exists());
    }

    #[test]
    fn remove_stale_respects_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DeploymentCache::new(dir.path().join("deploys"));

        assert_eq!(cache.remove_stale(Duration::from_secs(60)).unwrap(), 0);

        let fresh = cache.allocate("fresh").unwrap();

        assert_eq!(cache.remove_stale(Duration::from_secs(3600)).unwrap(), 0);
        assert!(fresh.path().exists());

        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(cache.remove_stale(Duration::ZERO).unwrap(), 1);
        assert!(!fresh.path().exists());
    }
}
