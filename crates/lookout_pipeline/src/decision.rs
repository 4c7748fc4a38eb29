//! Emit/discard policy for classified images.
//!
//! The policy is deliberately asymmetric: any label other than the
//! configured negative class is emitted regardless of score, and a
//! low-confidence negative classification is emitted too, so that an
//! unsure model surfaces the image for review instead of silently
//! discarding it. Only a confident negative classification discards.

/// What the router should do with the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Route outward: upload or publish.
    Emit,
    /// Route to local retention/deletion.
    Discard,
}

/// Why the action was chosen. Consumed by logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// A class other than the negative class was detected.
    LabelMatchedTarget,
    /// Negative class, but the score did not clear the threshold.
    ScoreBelowThreshold,
    /// Negative class with a confident score.
    ScoreAboveThresholdNoMatch,
}

/// Outcome of one decision. Computed per request, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub action: Action,
    pub reason: Reason,
}

/// Configuration-time constants of the decision, read-only during a run.
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    /// The negative/background class, e.g. "nothing".
    pub target_label: String,
    /// Confidence boundary in [0, 1]. Scores at or below it are treated
    /// as untrustworthy.
    pub threshold: f32,
}

impl DecisionPolicy {
    pub fn decide(&self, label: &str, score: f32) -> Verdict {
        decide(label, score, &self.target_label, self.threshold)
    }
}

/// Turn a label/score pair into a verdict.
///
/// The threshold comparison is inclusive: a score exactly equal to the
/// threshold counts as low confidence and emits.
pub fn decide(label: &str, score: f32, target_label: &str, threshold: f32) -> Verdict {
    if label != target_label {
        Verdict {
            action: Action::Emit,
            reason: Reason::LabelMatchedTarget,
        }
    } else if score <= threshold {
        Verdict {
            action: Action::Emit,
            reason: Reason::ScoreBelowThreshold,
        }
    } else {
        Verdict {
            action: Action::Discard,
            reason: Reason::ScoreAboveThresholdNoMatch,
        }
    }
}
