//! Polling directory watcher.
//!
//! Scans the watch directory on a fixed interval and enqueues every
//! file that newly matches the pattern since the previous scan. Files
//! already present at startup are snapshotted and not enqueued; only
//! arrivals after the watcher starts count as events. A file that is
//! deleted and later re-created under the same name fires again.

use anyhow::{ensure, Context, Result};
use globset::{Glob, GlobMatcher};
use lookout_pipeline::{ClassificationRequest, RequestSender};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Directory watched for new images. Not recursive.
    pub dir: PathBuf,
    /// Glob matched against file names, e.g. `*.jpg`.
    pub pattern: String,
    pub poll_interval: Duration,
}

pub struct DirectoryWatcher {
    config: WatcherConfig,
    matcher: GlobMatcher,
    queue: RequestSender,
    shutdown_rx: mpsc::Receiver<()>,
    seen: HashSet<PathBuf>,
}

impl DirectoryWatcher {
    /// Build the watcher. Returns the shutdown sender alongside.
    pub fn new(
        config: WatcherConfig,
        queue: RequestSender,
    ) -> Result<(Self, mpsc::Sender<()>)> {
        ensure!(
            config.dir.is_dir(),
            "watch directory {} does not exist",
            config.dir.display()
        );
        let matcher = Glob::new(&config.pattern)
            .with_context(|| format!("invalid watch pattern {:?}", config.pattern))?
            .compile_matcher();

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Ok((
            Self {
                config,
                matcher,
                queue,
                shutdown_rx,
                seen: HashSet::new(),
            },
            shutdown_tx,
        ))
    }

    /// Poll until shutdown or until the queue consumer goes away.
    pub async fn run(mut self) -> Result<()> {
        let preexisting = self.scan();
        info!(
            "watching {} for '{}' every {:?} ({} pre-existing files ignored)",
            self.config.dir.display(),
            self.config.pattern,
            self.config.poll_interval,
            preexisting.len()
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        'poll: loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    info!("shutdown signal received, stopping directory watcher");
                    break;
                }

                _ = interval.tick() => {
                    for path in self.scan() {
                        debug!("queueing new image {}", path.display());
                        if !self.queue.push(ClassificationRequest::from_path(path)) {
                            info!("request queue closed, stopping directory watcher");
                            break 'poll;
                        }
                    }
                }
            }
        }

        info!("directory watcher stopped");
        Ok(())
    }

    /// One pass over the directory. Returns paths that newly match, and
    /// forgets paths that disappeared so a re-created file fires again.
    fn scan(&mut self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.config.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("failed to read {}: {e}", self.config.dir.display());
                return Vec::new();
            }
        };

        let mut current = HashSet::new();
        let mut fresh = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("failed to read directory entry: {e}");
                    continue;
                }
            };
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file || !self.matcher.is_match(entry.file_name()) {
                continue;
            }
            let path = entry.path();
            if !self.seen.contains(&path) {
                fresh.push(path.clone());
            }
            current.insert(path);
        }

        fresh.sort();
        self.seen = current;
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_pipeline::{request_queue, ImagePayload};
    use tokio::time::timeout;

    const POLL: Duration = Duration::from_millis(20);
    const WAIT: Duration = Duration::from_secs(5);

    fn config(dir: &std::path::Path) -> WatcherConfig {
        WatcherConfig {
            dir: dir.to_path_buf(),
            pattern: "*.jpg".to_string(),
            poll_interval: POLL,
        }
    }

    fn payload_path(request: &ClassificationRequest) -> PathBuf {
        match &request.payload {
            ImagePayload::Path(path) => path.clone(),
            ImagePayload::Bytes(_) => panic!("watcher must enqueue path payloads"),
        }
    }

    #[test]
    fn missing_directory_is_rejected() {
        let (tx, _rx) = request_queue();
        let result = DirectoryWatcher::new(config(std::path::Path::new("/nonexistent")), tx);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = request_queue();
        let mut cfg = config(dir.path());
        cfg.pattern = "[".to_string();
        assert!(DirectoryWatcher::new(cfg, tx).is_err());
    }

    #[tokio::test]
    async fn enqueues_only_new_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.jpg"), b"old").unwrap();

        let (tx, mut rx) = request_queue();
        let (watcher, shutdown) = DirectoryWatcher::new(config(dir.path()), tx).unwrap();
        let handle = tokio::spawn(watcher.run());

        // Give the watcher time to take its startup snapshot.
        tokio::time::sleep(POLL * 4).await;
        std::fs::write(dir.path().join("new.jpg"), b"new").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip").unwrap();

        let request = timeout(WAIT, rx.pop()).await.unwrap().unwrap();
        assert_eq!(payload_path(&request), dir.path().join("new.jpg"));

        shutdown.send(()).await.unwrap();
        handle.await.unwrap().unwrap();

        // The watcher has stopped and dropped its sender; old.jpg and
        // notes.txt never arrived.
        assert!(rx.pop().await.is_none());
    }

    #[tokio::test]
    async fn recreated_file_fires_again() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam.jpg");

        let (tx, mut rx) = request_queue();
        let (watcher, shutdown) = DirectoryWatcher::new(config(dir.path()), tx).unwrap();
        let handle = tokio::spawn(watcher.run());

        tokio::time::sleep(POLL * 4).await;
        std::fs::write(&path, b"first").unwrap();
        let first = timeout(WAIT, rx.pop()).await.unwrap().unwrap();
        assert_eq!(payload_path(&first), path);

        std::fs::remove_file(&path).unwrap();
        tokio::time::sleep(POLL * 4).await;
        std::fs::write(&path, b"second").unwrap();
        let second = timeout(WAIT, rx.pop()).await.unwrap().unwrap();
        assert_eq!(payload_path(&second), path);
        assert_ne!(first.id, second.id);

        shutdown.send(()).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stops_when_consumer_goes_away() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = request_queue();
        let (watcher, _shutdown) = DirectoryWatcher::new(config(dir.path()), tx).unwrap();
        let handle = tokio::spawn(watcher.run());

        tokio::time::sleep(POLL * 2).await;
        drop(rx);
        std::fs::write(dir.path().join("cam.jpg"), b"img").unwrap();

        timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
    }
}
