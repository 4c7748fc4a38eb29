//! Local filesystem sink.

use crate::{FileStore, SinkError, SinkResult};
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filesystem-backed store for retained images.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStore;

impl FileStore for LocalStore {
    fn copy_to(&self, src: &Path, dest_dir: &Path) -> SinkResult<PathBuf> {
        let name = src
            .file_name()
            .ok_or_else(|| SinkError::message(format!("{} has no file name", src.display())))?;

        std::fs::create_dir_all(dest_dir)
            .with_context(|| format!("failed to create {}", dest_dir.display()))?;

        let dest = dest_dir.join(name);
        std::fs::copy(src, &dest)
            .with_context(|| format!("failed to copy {} to {}", src.display(), dest.display()))?;
        debug!("copied {} to {}", src.display(), dest.display());
        Ok(dest)
    }

    fn delete(&self, path: &Path) -> SinkResult<()> {
        std::fs::remove_file(path)
            .with_context(|| format!("failed to delete {}", path.display()))?;
        debug!("deleted {}", path.display());
        Ok(())
    }

    fn save(&self, bytes: &[u8], dest_dir: &Path) -> SinkResult<PathBuf> {
        std::fs::create_dir_all(dest_dir)
            .with_context(|| format!("failed to create {}", dest_dir.display()))?;

        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let mut dest = dest_dir.join(format!("{stamp}.jpg"));
        // Two saves inside the same millisecond get a numeric suffix.
        let mut attempt = 1u32;
        while dest.exists() {
            dest = dest_dir.join(format!("{stamp}-{attempt}.jpg"));
            attempt += 1;
        }

        std::fs::write(&dest, bytes)
            .with_context(|| format!("failed to write {}", dest.display()))?;
        debug!("saved {} bytes as {}", bytes.len(), dest.display());
        Ok(dest)
    }
}
