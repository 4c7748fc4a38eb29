//! FTP upload sink.
//!
//! Each upload is one short-lived session: connect, login, STOR the
//! file under its base name, quit. The control connection is opened
//! with an explicit connect timeout and read/write timeouts so a dead
//! endpoint fails the request instead of hanging the worker.
//!
//! The FTP protocol work is synchronous and runs on the blocking pool.

use crate::{FileTransfer, SinkError, SinkResult};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::BufReader;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::time::Duration;
use suppaftp::FtpStream;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote file-transfer endpoint, from the `ftp` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
}

fn default_port() -> u16 {
    21
}

/// Uploads local files to the configured FTP endpoint.
pub struct FtpUploader {
    config: FtpConfig,
}

impl FtpUploader {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl FileTransfer for FtpUploader {
    async fn upload(&mut self, path: &Path) -> SinkResult<()> {
        let config = self.config.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || upload_blocking(&config, &path))
            .await
            .map_err(|e| SinkError::message(format!("upload task failed: {e}")))?
    }
}

fn upload_blocking(config: &FtpConfig, path: &Path) -> SinkResult<()> {
    let name = path
        .file_name()
        .ok_or_else(|| SinkError::message(format!("{} has no file name", path.display())))?
        .to_string_lossy()
        .into_owned();

    // Open the local file before touching the network; a vanished
    // source file should not cost a connection attempt.
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {}:{}", config.host, config.port))?
        .next()
        .ok_or_else(|| {
            SinkError::message(format!("{}:{} resolved to no address", config.host, config.port))
        })?;

    let mut ftp = FtpStream::connect_timeout(addr, CONNECT_TIMEOUT)
        .with_context(|| format!("failed to connect to ftp {addr}"))?;
    ftp.get_ref()
        .set_read_timeout(Some(IO_TIMEOUT))
        .context("failed to set ftp read timeout")?;
    ftp.get_ref()
        .set_write_timeout(Some(IO_TIMEOUT))
        .context("failed to set ftp write timeout")?;

    ftp.login(&config.username, &config.password)
        .with_context(|| format!("ftp login failed for {}", config.username))?;

    ftp.put_file(&name, &mut reader)
        .with_context(|| format!("ftp upload of {name} failed"))?;
    debug!("uploaded {} as {name}", path.display());

    // Best effort; the transfer already completed.
    if let Err(e) = ftp.quit() {
        debug!("ftp quit failed: {e}");
    }
    Ok(())
}
