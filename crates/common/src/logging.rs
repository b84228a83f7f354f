//! File logging.
//!
//! Events are written to `godeploy-YYYY-MM-DD.log` inside the log directory,
//! leaving stdout and stderr to the interactive output.

use std::{
    fs::{self, OpenOptions},
    io,
    path::Path,
    sync::Mutex,
};

use derive_more::{Display, Error, From};
use tracing_core::Level;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::Settings;

/// Log file name prefix.
const LOG_FILE_PREFIX: &str = "godeploy-";

/// Log file name suffix.
const LOG_FILE_SUFFIX: &str = ".log";

/// Number of log files kept on disk, including the current one.
const MAX_LOG_FILES: usize = 3;

/// Logging initialization errors.
#[derive(Debug, Display, From, Error)]
pub enum LoggingError {
    /// IO-related error.
    Io(io::Error),

    /// A global subscriber is already installed.
    Init(TryInitError),
}

/// Install a global subscriber writing to today's file in `log_dir`.
///
/// Does nothing when the configured level is `off`. Older log files beyond
/// [`MAX_LOG_FILES`] are removed first.
pub fn init(settings: &Settings, log_dir: &Path) -> Result<(), LoggingError> {
    if settings.log_level == LevelFilter::OFF {
        return Ok(());
    }

    fs::create_dir_all(log_dir)?;

    let file_name = format!(
        "{LOG_FILE_PREFIX}{}{LOG_FILE_SUFFIX}",
        chrono::Local::now().format("%Y-%m-%d")
    );

    prune_log_files(log_dir, &file_name, MAX_LOG_FILES)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(file_name))?;

    let fmt = fmt::format().with_target(false).compact();

    let target_filters = Targets::new()
        .with_target("hyper", Level::WARN)
        .with_target("reqwest", Level::WARN)
        .with_default(settings.log_level);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .event_format(fmt)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(target_filters)
        .try_init()?;

    Ok(())
}

/// Remove the oldest log files so that at most `keep` remain once `current` is created.
fn prune_log_files(log_dir: &Path, current: &str, keep: usize) -> io::Result<()> {
    let mut names = fs::read_dir(log_dir)?
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(LOG_FILE_PREFIX) && name.ends_with(LOG_FILE_SUFFIX))
        .filter(|name| name != current)
        .collect::<Vec<_>>();

    // Dates in file names sort chronologically.
    names.sort();

    let excess = (names.len() + 1).saturating_sub(keep);

    for name in names.iter().take(excess) {
        fs::remove_file(log_dir.join(name))?;
    }

    Ok(())
}
