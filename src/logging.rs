//! Logging setup.
//!
//! Verbosity `0`, `1` and `2` map to the `error`, `info` and `debug` levels.
//! `RUST_LOG`, when set, takes precedence. With a log file configured, output
//! goes to the file only, unless verbosity is `2`, in which case it is also
//! written to stdout.
//!
//! The log file is rotated by size: `orderbot.log` becomes `orderbot.log.1`,
//! the previous `.1` becomes `.2`, and so on up to the configured number of
//! backups.

use crate::config::LogConfig;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Default size at which the log file is rotated (1 MiB)
pub const DEFAULT_LOG_MAX_BYTES: u64 = 1024 * 1024;

/// Default number of rotated log files kept
pub const DEFAULT_LOG_BACKUPS: usize = 2;

/// The filter directive for a verbosity level.
pub fn verbosity_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "info",
        _ => "debug",
    }
}

/// Installs the global tracing subscriber.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_directive(config.verbosity)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = match &config.file {
        Some(path) => {
            let file = Arc::new(RotatingFile::open(path, config.max_bytes, config.backups)?);
            if config.verbosity >= 2 {
                builder
                    .with_ansi(false)
                    .with_writer(io::stdout.and(file))
                    .try_init()
            } else {
                builder.with_ansi(false).with_writer(file).try_init()
            }
        }
        None => builder.try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

/// An append-mode log file that rotates once it grows past a size limit.
///
/// Shared as `Arc<RotatingFile>`, which tracing-subscriber accepts as a
/// writer because `&RotatingFile` implements [`Write`].
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    state: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    written: u64,
}

impl RotatingFile {
    /// Opens (or creates) `path` for appending.
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            path,
            max_bytes,
            backups,
            state: Mutex::new(FileState { file, written }),
        })
    }

    /// Path of backup number `index` (`<file>.<index>`).
    pub fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&self, state: &mut FileState) -> io::Result<()> {
        state.file.flush()?;

        if self.backups == 0 {
            state.file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&self.path)?;
        } else {
            for index in (1..self.backups).rev() {
                let from = self.backup_path(index);
                if from.exists() {
                    fs::rename(&from, self.backup_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
            state.file = open_append(&self.path)?;
        }

        state.written = 0;
        Ok(())
    }
}

impl Write for &RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.written > 0 && state.written + buf.len() as u64 > self.max_bytes {
            self.rotate(&mut state)?;
        }

        let n = state.file.write(buf)?;
        state.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .file
            .flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
