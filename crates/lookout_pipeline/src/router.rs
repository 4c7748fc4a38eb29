//! Verdict-driven sink routing.
//!
//! A router owns the sink handles for one deployment variant and maps a
//! verdict to the configured sequence of sink operations. Every
//! sub-operation is independently toggleable and a no-op when disabled.
//! Sub-operations are fire-and-forget in sequence: a failure is logged
//! and the remaining operations still run; nothing is rolled back or
//! retried.

use crate::decision::{Action, Verdict};
use crate::request::ClassificationRequest;
use async_trait::async_trait;
use lookout_sinks::{FileStore, FileTransfer, Publisher};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Routes one verdict to its side effects.
#[async_trait]
pub trait ActionRouter: Send {
    async fn route(&mut self, verdict: Verdict, request: &ClassificationRequest, bytes: &[u8]);
}

/// File-based deployment: emit uploads the source file to a remote
/// endpoint, discard copies it to a retention directory; the local
/// source file is deleted afterwards in both paths when enabled.
pub struct FileRouter<T, S> {
    transfer: Option<T>,
    store: S,
    copy_destination: Option<PathBuf>,
    delete_source: bool,
}

impl<T, S> FileRouter<T, S> {
    pub fn new(
        transfer: Option<T>,
        store: S,
        copy_destination: Option<PathBuf>,
        delete_source: bool,
    ) -> Self {
        Self {
            transfer,
            store,
            copy_destination,
            delete_source,
        }
    }
}

#[async_trait]
impl<T, S> ActionRouter for FileRouter<T, S>
where
    T: FileTransfer + Send,
    S: FileStore + Send,
{
    async fn route(&mut self, verdict: Verdict, request: &ClassificationRequest, _bytes: &[u8]) {
        let Some(path) = request.source_path() else {
            warn!("{request}: file router received an in-memory payload, nothing to route");
            return;
        };

        match verdict.action {
            Action::Emit => {
                if let Some(transfer) = self.transfer.as_mut() {
                    debug!("{request}: uploading {}", path.display());
                    if let Err(e) = transfer.upload(path).await {
                        warn!("{request}: upload failed: {e}");
                    }
                }
            }
            Action::Discard => {
                if let Some(destination) = &self.copy_destination {
                    debug!("{request}: copying {} to {}", path.display(), destination.display());
                    if let Err(e) = self.store.copy_to(path, destination) {
                        warn!("{request}: copy failed: {e}");
                    }
                }
            }
        }

        if self.delete_source {
            debug!("{request}: deleting {}", path.display());
            if let Err(e) = self.store.delete(path) {
                warn!("{request}: delete failed: {e}");
            }
        }
    }
}

/// Bus-based deployment: emit publishes the raw bytes to the outbound
/// topic, discard saves them to a timestamp-named file in a retention
/// directory.
pub struct BusRouter<P, S> {
    publisher: Option<P>,
    store: S,
    save_destination: Option<PathBuf>,
}

impl<P, S> BusRouter<P, S> {
    pub fn new(publisher: Option<P>, store: S, save_destination: Option<PathBuf>) -> Self {
        Self {
            publisher,
            store,
            save_destination,
        }
    }
}

#[async_trait]
impl<P, S> ActionRouter for BusRouter<P, S>
where
    P: Publisher + Send,
    S: FileStore + Send,
{
    async fn route(&mut self, verdict: Verdict, request: &ClassificationRequest, bytes: &[u8]) {
        match verdict.action {
            Action::Emit => {
                if let Some(publisher) = self.publisher.as_mut() {
                    debug!("{request}: publishing {} bytes", bytes.len());
                    if let Err(e) = publisher.publish(bytes).await {
                        warn!("{request}: publish failed: {e}");
                    }
                }
            }
            Action::Discard => {
                if let Some(destination) = &self.save_destination {
                    debug!("{request}: saving {} bytes to {}", bytes.len(), destination.display());
                    match self.store.save(bytes, destination) {
                        Ok(path) => debug!("{request}: saved as {}", path.display()),
                        Err(e) => warn!("{request}: save failed: {e}"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Reason;
    use lookout_sinks::{SinkError, SinkResult};
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Upload(PathBuf),
        Copy(PathBuf, PathBuf),
        Delete(PathBuf),
        Save(Vec<u8>, PathBuf),
        Publish(Vec<u8>),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_upload: bool,
    }

    impl Recorder {
        fn failing_upload() -> Self {
            Self {
                fail_upload: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl FileTransfer for Recorder {
        async fn upload(&mut self, path: &Path) -> SinkResult<()> {
            self.record(Call::Upload(path.to_path_buf()));
            if self.fail_upload {
                return Err(SinkError::Message {
                    message: "connection refused".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Publisher for Recorder {
        async fn publish(&mut self, bytes: &[u8]) -> SinkResult<()> {
            self.record(Call::Publish(bytes.to_vec()));
            Ok(())
        }
    }

    impl FileStore for Recorder {
        fn copy_to(&self, src: &Path, dest_dir: &Path) -> SinkResult<PathBuf> {
            self.record(Call::Copy(src.to_path_buf(), dest_dir.to_path_buf()));
            Ok(dest_dir.join(src.file_name().unwrap()))
        }

        fn delete(&self, path: &Path) -> SinkResult<()> {
            self.record(Call::Delete(path.to_path_buf()));
            Ok(())
        }

        fn save(&self, bytes: &[u8], dest_dir: &Path) -> SinkResult<PathBuf> {
            self.record(Call::Save(bytes.to_vec(), dest_dir.to_path_buf()));
            Ok(dest_dir.join("saved.jpg"))
        }
    }

    fn emit() -> Verdict {
        Verdict {
            action: Action::Emit,
            reason: Reason::LabelMatchedTarget,
        }
    }

    fn discard() -> Verdict {
        Verdict {
            action: Action::Discard,
            reason: Reason::ScoreAboveThresholdNoMatch,
        }
    }

    #[tokio::test]
    async fn disabled_file_router_has_no_side_effects() {
        let recorder = Recorder::default();
        let mut router =
            FileRouter::new(None::<Recorder>, recorder.clone(), None, false);
        let request = ClassificationRequest::from_path("/spool/a.jpg");

        router.route(emit(), &request, b"img").await;
        router.route(discard(), &request, b"img").await;

        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn emit_uploads_then_deletes() {
        let recorder = Recorder::default();
        let mut router = FileRouter::new(
            Some(recorder.clone()),
            recorder.clone(),
            Some(PathBuf::from("/retained")),
            true,
        );
        let request = ClassificationRequest::from_path("/spool/a.jpg");

        router.route(emit(), &request, b"img").await;

        assert_eq!(
            recorder.calls(),
            vec![
                Call::Upload(PathBuf::from("/spool/a.jpg")),
                Call::Delete(PathBuf::from("/spool/a.jpg")),
            ]
        );
    }

    #[tokio::test]
    async fn discard_copies_then_deletes_without_upload() {
        let recorder = Recorder::default();
        let mut router = FileRouter::new(
            Some(recorder.clone()),
            recorder.clone(),
            Some(PathBuf::from("/retained")),
            true,
        );
        let request = ClassificationRequest::from_path("/spool/a.jpg");

        router.route(discard(), &request, b"img").await;

        assert_eq!(
            recorder.calls(),
            vec![
                Call::Copy(PathBuf::from("/spool/a.jpg"), PathBuf::from("/retained")),
                Call::Delete(PathBuf::from("/spool/a.jpg")),
            ]
        );
    }

    #[tokio::test]
    async fn failed_upload_does_not_short_circuit_delete() {
        let recorder = Recorder::failing_upload();
        let mut router =
            FileRouter::new(Some(recorder.clone()), recorder.clone(), None, true);
        let request = ClassificationRequest::from_path("/spool/a.jpg");

        router.route(emit(), &request, b"img").await;

        assert_eq!(
            recorder.calls(),
            vec![
                Call::Upload(PathBuf::from("/spool/a.jpg")),
                Call::Delete(PathBuf::from("/spool/a.jpg")),
            ]
        );
    }

    #[tokio::test]
    async fn bus_router_publishes_on_emit_and_saves_on_discard() {
        let recorder = Recorder::default();
        let mut router = BusRouter::new(
            Some(recorder.clone()),
            recorder.clone(),
            Some(PathBuf::from("/retained")),
        );
        let request = ClassificationRequest::from_bytes(b"img".to_vec());

        router.route(emit(), &request, b"img").await;
        router.route(discard(), &request, b"img").await;

        assert_eq!(
            recorder.calls(),
            vec![
                Call::Publish(b"img".to_vec()),
                Call::Save(b"img".to_vec(), PathBuf::from("/retained")),
            ]
        );
    }

    #[tokio::test]
    async fn disabled_bus_router_has_no_side_effects() {
        let recorder = Recorder::default();
        let mut router = BusRouter::new(None::<Recorder>, recorder.clone(), None);
        let request = ClassificationRequest::from_bytes(b"img".to_vec());

        router.route(emit(), &request, b"img").await;
        router.route(discard(), &request, b"img").await;

        assert!(recorder.calls().is_empty());
    }
}
