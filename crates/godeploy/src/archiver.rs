//! # Archiver
//!
//! SPA build output is packaged into a ZIP file before uploading.
//!
//! The source directory is walked recursively in file name order, and every
//! regular file is stored as a deflate-compressed entry named by its path
//! relative to the source directory, always with forward slashes. Directory
//! entries are never written; they are implied by the file paths.
//!
//! File count and total size are accumulated while the entries are written,
//! so the statistics always describe exactly what went into the archive.

use std::{
    fs::{self, File},
    io::{self, BufWriter},
    path::{Path, PathBuf, StripPrefixError},
    time::{Duration, Instant},
};

use derive_more::{Display, Error, From};
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

/// Errors that may occur during the archive creation process.
#[derive(Debug, Display, From, Error)]
pub(crate) enum ArchiverError {
    /// [`zip`]-crate specific error.
    Zip(zip::result::ZipError),

    /// [`walkdir`]-crate specific error.
    WalkDir(walkdir::Error),

    /// IO error.
    Io(io::Error),

    /// Unable to strip source directory prefix from path.
    StripPrefix(StripPrefixError),
}

/// Statistics of a finished archive build.
#[derive(Debug, Clone)]
pub(crate) struct ArchiveStats {
    /// Number of files stored in the archive.
    pub file_count: u64,

    /// Sum of uncompressed file sizes, in bytes.
    pub total_size: u64,

    /// Size of the archive on disk, in bytes.
    pub compressed_size: u64,

    /// Archive size relative to the total size, in percent. Zero for empty sources.
    pub compression_ratio: f64,

    /// Wall-clock build time.
    pub duration: Duration,

    /// Archived directory.
    pub source_dir: PathBuf,

    /// Produced archive.
    pub output_path: PathBuf,
}

/// Archive every file under `source_dir` into a new ZIP file at `output_path`.
///
/// On error the partially written archive is left in place; removing it is up to the caller.
pub(crate) fn build_zip_archive(
    source_dir: &Path,
    output_path: &Path,
) -> Result<ArchiveStats, ArchiverError> {
    let started = Instant::now();

    let mut writer = ZipWriter::new(BufWriter::new(File::create(output_path)?));

    let mut file_count = 0;
    let mut total_size = 0;

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry?;

        // Follows symlinks, so links to directories are skipped as well.
        if entry.path().is_dir() {
            continue;
        }

        let relative = entry.path().strip_prefix(source_dir)?;

        let Some(name) = entry_name(relative) else {
            tracing::warn!(path = %entry.path().display(), "skipping file with non-unicode path");
            continue;
        };

        writer.start_file(name, entry_options(entry.path())?)?;
        total_size += io::copy(&mut File::open(entry.path())?, &mut writer)?;
        file_count += 1;
    }

    writer.finish()?.into_inner().map_err(io::Error::from)?.sync_all()?;

    let compressed_size = fs::metadata(output_path)?.len();

    let compression_ratio = if total_size > 0 {
        compressed_size as f64 / total_size as f64 * 100.0
    } else {
        0.0
    };

    let stats = ArchiveStats {
        file_count,
        total_size,
        compressed_size,
        compression_ratio,
        duration: started.elapsed(),
        source_dir: source_dir.to_path_buf(),
        output_path: output_path.to_path_buf(),
    };

    tracing::debug!(
        source = %stats.source_dir.display(),
        output = %stats.output_path.display(),
        files = stats.file_count,
        total_size = stats.total_size,
        compressed_size = stats.compressed_size,
        "archive created"
    );

    Ok(stats)
}

/// ZIP entry name for a path relative to the source directory.
fn entry_name(relative: &Path) -> Option<String> {
    let components = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;

    Some(components.join("/"))
}

/// Deflate options, carrying unix permission bits where available.
fn entry_options(path: &Path) -> io::Result<FileOptions> {
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mode = fs::metadata(path)?.permissions().mode();
        Ok(options.unix_permissions(mode & 0o777))
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{self, File},
        io::Read,
        path::Path,
    };

    use zip::{CompressionMethod, ZipArchive};

    use super::{build_zip_archive, entry_name};

    fn write_file(root: &Path, relative: &str, len: usize) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "a".repeat(len)).unwrap();
    }

    #[test]
    fn archives_nested_files_with_stats() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let output_path = output.path().join("site.zip");

        write_file(source.path(), "index.html", 1200);
        write_file(source.path(), "assets/js/app.js", 5000);
        write_file(source.path(), "assets/css/app.css", 800);
        fs::create_dir_all(source.path().join("empty")).unwrap();

        let stats = build_zip_archive(source.path(), &output_path).unwrap();

        assert_eq!(stats.file_count, 3);
        assert_eq!(stats.total_size, 7000);
        assert_eq!(stats.compressed_size, fs::metadata(&output_path).unwrap().len());
        assert!(stats.compression_ratio > 0.0 && stats.compression_ratio < 100.0);
        assert_eq!(stats.output_path, output_path);

        let mut archive = ZipArchive::new(File::open(&output_path).unwrap()).unwrap();
        let mut names = archive.file_names().map(String::from).collect::<Vec<_>>();
        names.sort();

        assert_eq!(
            names,
            ["assets/css/app.css", "assets/js/app.js", "index.html"]
        );

        let mut entry = archive.by_name("assets/js/app.js").unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);

        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content.len(), 5000);
    }

    #[test]
    fn empty_directory_has_zero_ratio() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let output_path = output.path().join("empty.zip");

        let stats = build_zip_archive(source.path(), &output_path).unwrap();

        assert_eq!(stats.file_count, 0);
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.compression_ratio, 0.0);
        assert!(stats.compressed_size > 0);

        let archive = ZipArchive::new(File::open(&output_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn missing_source_is_an_error() {
        let output = tempfile::tempdir().unwrap();
        let missing = output.path().join("missing");

        assert!(build_zip_archive(&missing, &output.path().join("out.zip")).is_err());
    }

    #[test]
    fn entry_names_use_forward_slashes() {
        let relative = Path::new("assets").join("img").join("logo.svg");

        assert_eq!(entry_name(&relative).unwrap(), "assets/img/logo.svg");
    }
}
