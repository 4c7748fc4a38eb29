//! Label vocabulary loaded from the model directory.

use crate::ClassifierError;
use std::path::Path;

/// Filename of the vocabulary inside the model directory, one label per
/// line in class-index order.
const LABELS_FILE: &str = "output_labels.txt";

/// The closed set of class labels the model can produce.
#[derive(Debug, Clone)]
pub struct LabelVocabulary {
    labels: Vec<String>,
}

impl LabelVocabulary {
    /// Read `output_labels.txt` from the model directory.
    pub fn load(model_dir: &Path) -> Result<Self, ClassifierError> {
        let path = model_dir.join(LABELS_FILE);
        let contents =
            std::fs::read_to_string(&path).map_err(|source| ClassifierError::VocabularyIo {
                path: path.clone(),
                source,
            })?;

        let labels: Vec<String> = contents
            .lines()
            .map(|line| line.trim_end().to_string())
            .filter(|line| !line.is_empty())
            .collect();

        if labels.is_empty() {
            return Err(ClassifierError::EmptyVocabulary { path });
        }

        Ok(Self { labels })
    }

    /// Build a vocabulary from in-memory labels. Used by tests and by
    /// callers that resolve labels some other way.
    pub fn from_labels(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Label for a class index, if in range.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Whether a label is part of the vocabulary. Startup validation uses
    /// this to reject a target label the model can never produce.
    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}
