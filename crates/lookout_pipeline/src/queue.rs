//! Unbounded FIFO hand-off between image sources and the inference worker.
//!
//! Producers never block and never observe backpressure; the worker
//! blocks on [`RequestReceiver::pop`] while the queue is empty. FIFO
//! order holds per producer; concurrent pushes from different producers
//! interleave in channel-arrival order, not wall-clock order.
//!
//! Depth is unbounded to match the producer contract. A source that
//! outruns the classifier for long enough will grow the queue without
//! limit; the deployment must keep arrival rate below classification
//! throughput.

use crate::request::ClassificationRequest;
use tokio::sync::mpsc;

/// Create a connected producer/consumer pair.
pub fn request_queue() -> (RequestSender, RequestReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RequestSender { tx }, RequestReceiver { rx })
}

/// Producer handle. Cheap to clone; one per source task.
#[derive(Clone)]
pub struct RequestSender {
    tx: mpsc::UnboundedSender<ClassificationRequest>,
}

impl RequestSender {
    /// Append a request to the tail of the queue.
    ///
    /// Never blocks. Returns false when the consumer is gone (service
    /// shutting down), in which case the request is dropped.
    pub fn push(&self, request: ClassificationRequest) -> bool {
        self.tx.send(request).is_ok()
    }
}

/// Consumer handle, owned by the single inference worker.
pub struct RequestReceiver {
    rx: mpsc::UnboundedReceiver<ClassificationRequest>,
}

impl RequestReceiver {
    /// Wait for the head of the queue.
    ///
    /// Returns `None` once every producer handle has been dropped and
    /// the queue is drained.
    pub async fn pop(&mut self) -> Option<ClassificationRequest> {
        self.rx.recv().await
    }
}
