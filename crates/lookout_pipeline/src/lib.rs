//! Classification dispatch pipeline.
//!
//! Connects image sources to sink actions through a single inference
//! worker: sources push [`ClassificationRequest`]s into an unbounded FIFO
//! queue, the worker dequeues one request at a time, classifies it, turns
//! the label/score pair into a [`Verdict`], and hands the verdict to an
//! [`ActionRouter`] that drives the configured sinks.
//!
//! The queue is the only synchronization point between producers and the
//! worker. The classifier is owned exclusively by the worker task; there
//! is never more than one classification in flight.

pub mod decision;
pub mod queue;
pub mod request;
pub mod router;
pub mod worker;

pub use decision::{decide, Action, DecisionPolicy, Reason, Verdict};
pub use queue::{request_queue, RequestReceiver, RequestSender};
pub use request::{ClassificationRequest, ImagePayload, SourceError};
pub use router::{ActionRouter, BusRouter, FileRouter};
pub use worker::PipelineWorker;
