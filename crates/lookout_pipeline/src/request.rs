//! Units of work flowing through the dispatch pipeline.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors raised while materializing a request payload.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read image {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("empty image payload")]
    EmptyPayload,
}

/// Image payload carried by a request.
///
/// Path payloads are lazy (bytes read at classification time); byte
/// payloads arrive already resident, e.g. from a bus message. The enum
/// guarantees exactly one representation is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// One unit of classification work.
///
/// The id is a process-local monotonic counter used to correlate log
/// lines; nothing is persisted across restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRequest {
    pub id: u64,
    pub payload: ImagePayload,
}

impl ClassificationRequest {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            payload: ImagePayload::Path(path.into()),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            payload: ImagePayload::Bytes(bytes),
        }
    }

    /// Local source file, when the request originated from the watcher.
    pub fn source_path(&self) -> Option<&Path> {
        match &self.payload {
            ImagePayload::Path(path) => Some(path),
            ImagePayload::Bytes(_) => None,
        }
    }

    /// Normalize the payload to raw image bytes.
    ///
    /// Path payloads are read from disk here, not at enqueue time, so a
    /// deep queue does not pin file contents in memory.
    pub fn read_bytes(&self) -> Result<Cow<'_, [u8]>, SourceError> {
        match &self.payload {
            ImagePayload::Path(path) => {
                let bytes = std::fs::read(path).map_err(|source| SourceError::Read {
                    path: path.clone(),
                    source,
                })?;
                if bytes.is_empty() {
                    return Err(SourceError::EmptyPayload);
                }
                Ok(Cow::Owned(bytes))
            }
            ImagePayload::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(SourceError::EmptyPayload);
                }
                Ok(Cow::Borrowed(bytes.as_slice()))
            }
        }
    }
}

impl fmt::Display for ClassificationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            ImagePayload::Path(path) => write!(f, "request {} ({})", self.id, path.display()),
            ImagePayload::Bytes(bytes) => {
                write!(f, "request {} ({} bytes in memory)", self.id, bytes.len())
            }
        }
    }
}
