//! Image classification capability.
//!
//! The model itself lives in an external inference runner; this crate
//! owns the seam: the [`Classifier`] trait consumed by the pipeline, the
//! label vocabulary loaded from the model directory, and the long-lived
//! subprocess implementation that speaks a small framed protocol with
//! the runner.

pub mod labels;
pub mod subprocess;

pub use labels::LabelVocabulary;
pub use subprocess::{resolve_runner, SubprocessClassifier};

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-1 result for one image.
///
/// The label is the argmax class drawn from the vocabulary loaded at
/// startup; the score is its probability.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub score: f32,
}

/// Errors raised while loading the vocabulary or classifying an image.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to read label vocabulary {path}: {source}")]
    VocabularyIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("label vocabulary {path} is empty")]
    EmptyVocabulary { path: PathBuf },

    #[error("failed to spawn classifier runner {runner}: {source}")]
    Spawn {
        runner: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("classifier runner closed its pipes")]
    RunnerGone,

    #[error("classifier i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed classifier response {response:?}: {message}")]
    MalformedResponse { response: String, message: String },

    #[error("classifier returned label index {index}, vocabulary has {len} labels")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("classifier returned score {score} outside [0, 1]")]
    ScoreOutOfRange { score: f32 },

    #[error("classification timed out after {0:?}")]
    Timeout(Duration),
}

/// Stateless-per-call classification of raw image bytes.
///
/// Implementations may hold an expensive execution context (a model
/// instance, a child process); the pipeline therefore takes `&mut self`
/// and never classifies two images concurrently.
#[async_trait]
pub trait Classifier: Send {
    async fn classify(&mut self, image: &[u8]) -> Result<Classification, ClassifierError>;
}
