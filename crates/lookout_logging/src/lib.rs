//! Shared logging setup for the lookout binary.
//!
//! Emits to stderr and, when a log file is configured, to a
//! size-capped rotating file (`lookout.log`, `lookout.log.1`, ...),
//! so an unattended edge box cannot fill its disk with logs.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration resolved from the `logging` config section and
/// the CLI.
pub struct LogConfig<'a> {
    /// Base filter level, e.g. "info" or "debug".
    pub level: &'a str,
    /// Log file path; stderr-only when absent.
    pub filename: Option<&'a Path>,
    /// Force the console to the full filter regardless of level.
    pub verbose: bool,
}

/// Initialize tracing. `RUST_LOG` overrides the configured level.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level));
    let console_filter = if config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level))
    };

    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_filter(console_filter),
    );

    match config.filename {
        Some(path) => {
            let writer = RotatingWriter::open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_filter(base_filter),
                )
                .init();
        }
        None => registry.init(),
    }

    Ok(())
}

/// Append-only log file that rotates at a size cap.
///
/// Rotation renames `name.log` to `name.log.1`, shifting older files up
/// and dropping the oldest beyond [`MAX_LOG_FILES`].
struct RotatingLogFile {
    path: PathBuf,
    file: File,
    written: u64,
}

impl RotatingLogFile {
    fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written,
        })
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        let oldest = self.rotated_path(MAX_LOG_FILES - 1);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        for index in (1..MAX_LOG_FILES - 1).rev() {
            let from = self.rotated_path(index);
            if from.exists() {
                std::fs::rename(&from, self.rotated_path(index + 1))?;
            }
        }
        if self.path.exists() {
            std::fs::rename(&self.path, self.rotated_path(1))?;
        }

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > MAX_LOG_FILE_SIZE {
            self.rotate()?;
        }
        let written = self.file.write(buf)?;
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Clonable `MakeWriter` over the shared rotating file.
#[derive(Clone)]
struct RotatingWriter {
    inner: Arc<Mutex<RotatingLogFile>>,
}

impl RotatingWriter {
    fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(RotatingLogFile::open(path)?)),
        })
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut file = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        file.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingWriter {
    type Writer = RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
