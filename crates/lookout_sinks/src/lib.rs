//! Sink capabilities for the emit and discard routing paths.
//!
//! Each sink performs one externally visible side effect: uploading a
//! file to an FTP endpoint, publishing bytes to an MQTT topic, or
//! mutating the local filesystem (copy, delete, save). The pipeline's
//! routers drive sinks through the traits defined here; the concrete
//! implementations live in the submodules.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod bus;
pub mod ftp;
pub mod store;

pub use bus::MqttPublisher;
pub use ftp::{FtpConfig, FtpUploader};
pub use store::LocalStore;

/// Errors returned by sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{message}")]
    Message { message: String },
    #[error("{message}")]
    Source {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

impl SinkError {
    pub(crate) fn message(message: impl Into<String>) -> Self {
        SinkError::Message {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for SinkError {
    fn from(err: anyhow::Error) -> Self {
        SinkError::Source {
            message: err.to_string(),
            source: err,
        }
    }
}

/// Upload a local file to a remote file-transfer endpoint.
#[async_trait]
pub trait FileTransfer: Send {
    async fn upload(&mut self, path: &Path) -> SinkResult<()>;
}

/// Publish raw bytes to an outbound topic.
#[async_trait]
pub trait Publisher: Send {
    async fn publish(&mut self, bytes: &[u8]) -> SinkResult<()>;
}

/// Local filesystem operations used by both routing variants.
pub trait FileStore: Send {
    /// Copy `src` into `dest_dir`, keeping its file name.
    fn copy_to(&self, src: &Path, dest_dir: &Path) -> SinkResult<PathBuf>;

    /// Remove a local source file.
    fn delete(&self, path: &Path) -> SinkResult<()>;

    /// Write bytes to a fresh timestamp-named file in `dest_dir`.
    fn save(&self, bytes: &[u8], dest_dir: &Path) -> SinkResult<PathBuf>;
}
