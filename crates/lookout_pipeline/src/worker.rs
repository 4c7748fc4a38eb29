//! Inference worker loop.
//!
//! The single long-lived consumer: dequeue, classify, decide, route,
//! repeat. One request is processed at a time; the classifier handle is
//! owned exclusively by this loop and is never shared, so queuing is the
//! only form of concurrency across requests.
//!
//! Per-request failures (unreadable source file, classifier error, sink
//! error) are logged and isolated to that request; the loop itself only
//! stops on a shutdown signal or when every producer is gone. Shutdown
//! is checked between requests, so an in-flight request always completes
//! before the loop exits.

use crate::decision::{DecisionPolicy, Reason};
use crate::queue::RequestReceiver;
use crate::request::ClassificationRequest;
use crate::router::ActionRouter;
use anyhow::Result;
use lookout_classifier::Classifier;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct PipelineWorker<C, R> {
    policy: DecisionPolicy,
    classifier: C,
    router: R,
    queue: RequestReceiver,
    shutdown_rx: mpsc::Receiver<()>,
}

impl<C, R> PipelineWorker<C, R>
where
    C: Classifier + Send,
    R: ActionRouter,
{
    /// Build the worker. Returns the shutdown sender alongside; a single
    /// send unblocks the queue wait and stops the loop after the
    /// in-flight request, if any, has been routed.
    pub fn new(
        policy: DecisionPolicy,
        classifier: C,
        router: R,
        queue: RequestReceiver,
    ) -> (Self, mpsc::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (
            Self {
                policy,
                classifier,
                router,
                queue,
                shutdown_rx,
            },
            shutdown_tx,
        )
    }

    /// Main loop. Consumes self; can only be called once.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "inference worker started (target label '{}', threshold {})",
            self.policy.target_label, self.policy.threshold
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    info!("shutdown signal received, stopping inference worker");
                    break;
                }

                request = self.queue.pop() => {
                    match request {
                        Some(request) => self.process(request).await,
                        None => {
                            info!("request queue closed, stopping inference worker");
                            break;
                        }
                    }
                }
            }
        }

        info!("inference worker stopped");
        Ok(())
    }

    async fn process(&mut self, request: ClassificationRequest) {
        let bytes = match request.read_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("{request}: dropping request, {e}");
                return;
            }
        };

        let classification = match self.classifier.classify(&bytes).await {
            Ok(classification) => classification,
            Err(e) => {
                error!("{request}: classification failed, dropping request: {e}");
                return;
            }
        };

        let verdict = self
            .policy
            .decide(&classification.label, classification.score);
        info!(
            "{} classified as '{}' with score {:.5} -> {:?}",
            request, classification.label, classification.score, verdict.action
        );
        match verdict.reason {
            Reason::LabelMatchedTarget => {
                debug!(
                    "{request}: emitting, '{}' was detected",
                    classification.label
                );
            }
            Reason::ScoreBelowThreshold => {
                debug!(
                    "{request}: emitting, score {:.5} is at or below threshold {}",
                    classification.score, self.policy.threshold
                );
            }
            Reason::ScoreAboveThresholdNoMatch => {
                debug!(
                    "{request}: not emitting, '{}' detected with probability {:.5}",
                    classification.label, classification.score
                );
            }
        }

        self.router.route(verdict, &request, &bytes).await;
    }
}
