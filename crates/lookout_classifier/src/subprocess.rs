//! Long-lived inference runner subprocess.
//!
//! The runner is spawned once at startup with the model directory and
//! kept alive for the life of the service; spawning it is the expensive
//! `Load(model_dir)` step, classification is one framed exchange per
//! image.
//!
//! ## Transport
//! Requests go to the runner's stdin as a 4-byte big-endian length
//! prefix followed by the raw image bytes. The runner answers on stdout
//! with one JSON line: `{"index": <class index>, "score": <probability>}`.
//! The host maps the index through the label vocabulary.
//!
//! ## Timeouts
//! Each exchange is bounded by a classify timeout. A timed-out exchange
//! leaves the pipe mid-frame, so the child is killed and subsequent
//! calls fail fast instead of desynchronizing.

use crate::{Classification, Classifier, ClassifierError, LabelVocabulary};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Environment override for the runner binary location.
const RUNNER_ENV: &str = "LOOKOUT_CLASSIFY_BIN";

/// Default runner binary name, looked up next to the current executable.
const RUNNER_BIN: &str = "lookout-classify";

/// Upper bound on one classification exchange.
const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(60);

/// Cap on a response line; anything longer is a runner bug.
const MAX_RESPONSE_LEN: usize = 64 * 1024;

/// Locate the inference runner binary.
///
/// Resolution order: explicit configured path, `LOOKOUT_CLASSIFY_BIN`
/// env var, `lookout-classify` next to the current executable, bare
/// binary name resolved through PATH.
pub fn resolve_runner(configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(RUNNER_ENV) {
        return PathBuf::from(path);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| {
            exe.parent()
                .map(|dir| dir.join(RUNNER_BIN))
                .filter(|candidate| candidate.exists())
        })
        .unwrap_or_else(|| PathBuf::from(RUNNER_BIN))
}

#[derive(Debug, Deserialize)]
struct RunnerResponse {
    index: usize,
    score: f32,
}

pub struct SubprocessClassifier {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    vocabulary: LabelVocabulary,
    timeout: Duration,
}

impl SubprocessClassifier {
    /// Spawn the runner for the given model directory.
    pub async fn spawn(
        runner: &Path,
        model_dir: &Path,
        vocabulary: LabelVocabulary,
    ) -> Result<Self, ClassifierError> {
        let mut child = Command::new(runner)
            .arg("--model-dir")
            .arg(model_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ClassifierError::Spawn {
                runner: runner.to_path_buf(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(ClassifierError::RunnerGone)?;
        let stdout = child.stdout.take().ok_or(ClassifierError::RunnerGone)?;

        info!(
            "classifier runner started: {} (model dir {}, {} labels)",
            runner.display(),
            model_dir.display(),
            vocabulary.len()
        );

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            vocabulary,
            timeout: CLASSIFY_TIMEOUT,
        })
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn exchange(&mut self, image: &[u8]) -> Result<Classification, ClassifierError> {
        self.stdin.write_all(&frame_header(image.len())).await?;
        self.stdin.write_all(image).await?;
        self.stdin.flush().await?;

        let mut line = String::new();
        let read = self.stdout.read_line(&mut line).await?;
        if read == 0 {
            return Err(ClassifierError::RunnerGone);
        }
        if line.len() > MAX_RESPONSE_LEN {
            return Err(ClassifierError::MalformedResponse {
                response: format!("<{} byte line>", line.len()),
                message: "response line exceeds limit".to_string(),
            });
        }

        parse_response(line.trim_end(), &self.vocabulary)
    }
}

#[async_trait]
impl Classifier for SubprocessClassifier {
    async fn classify(&mut self, image: &[u8]) -> Result<Classification, ClassifierError> {
        debug!("classifying {} bytes", image.len());
        match tokio::time::timeout(self.timeout, self.exchange(image)).await {
            Ok(result) => result,
            Err(_) => {
                // The exchange died mid-frame; the pipe can no longer be
                // trusted, so take the runner down with it.
                warn!("classification exceeded {:?}, killing runner", self.timeout);
                if let Err(e) = self.child.kill().await {
                    warn!("failed to kill classifier runner: {e}");
                }
                Err(ClassifierError::Timeout(self.timeout))
            }
        }
    }
}

/// 4-byte big-endian length prefix for one request frame.
fn frame_header(len: usize) -> [u8; 4] {
    (len as u32).to_be_bytes()
}

/// Parse one runner response line and map the class index to a label.
fn parse_response(
    line: &str,
    vocabulary: &LabelVocabulary,
) -> Result<Classification, ClassifierError> {
    let response: RunnerResponse =
        serde_json::from_str(line).map_err(|e| ClassifierError::MalformedResponse {
            response: line.to_string(),
            message: e.to_string(),
        })?;

    let label = vocabulary
        .get(response.index)
        .ok_or(ClassifierError::IndexOutOfRange {
            index: response.index,
            len: vocabulary.len(),
        })?;

    if !(0.0..=1.0).contains(&response.score) {
        return Err(ClassifierError::ScoreOutOfRange {
            score: response.score,
        });
    }

    Ok(Classification {
        label: label.to_string(),
        score: response.score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocabulary() -> LabelVocabulary {
        LabelVocabulary::from_labels(vec!["nothing".to_string(), "person".to_string()])
    }

    #[test]
    fn frame_header_is_big_endian_length() {
        assert_eq!(frame_header(0), [0, 0, 0, 0]);
        assert_eq!(frame_header(1), [0, 0, 0, 1]);
        assert_eq!(frame_header(0x0102_0304), [1, 2, 3, 4]);
    }

    #[test]
    fn parses_valid_response() {
        let classification =
            parse_response(r#"{"index": 1, "score": 0.93}"#, &vocabulary()).unwrap();
        assert_eq!(classification.label, "person");
        assert!((classification.score - 0.93).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_index_out_of_range() {
        assert!(matches!(
            parse_response(r#"{"index": 5, "score": 0.5}"#, &vocabulary()),
            Err(ClassifierError::IndexOutOfRange { index: 5, len: 2 })
        ));
    }

    #[test]
    fn rejects_score_out_of_range() {
        assert!(matches!(
            parse_response(r#"{"index": 0, "score": 1.5}"#, &vocabulary()),
            Err(ClassifierError::ScoreOutOfRange { .. })
        ));
        assert!(matches!(
            parse_response(r#"{"index": 0, "score": -0.1}"#, &vocabulary()),
            Err(ClassifierError::ScoreOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            parse_response("not json", &vocabulary()),
            Err(ClassifierError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_response(r#"{"score": 0.5}"#, &vocabulary()),
            Err(ClassifierError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn boundary_scores_are_accepted() {
        assert!(parse_response(r#"{"index": 0, "score": 0.0}"#, &vocabulary()).is_ok());
        assert!(parse_response(r#"{"index": 0, "score": 1.0}"#, &vocabulary()).is_ok());
    }

    /// A runner that echoes a fixed response exercises the full framed
    /// exchange against a real child process.
    #[tokio::test]
    async fn classifies_via_scripted_runner() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("runner.sh");
        // Reads nothing, answers every invocation with one line. The
        // frame on stdin is simply ignored by this stand-in.
        std::fs::write(
            &script,
            "#!/bin/sh\nwhile true; do echo '{\"index\": 1, \"score\": 0.75}'; sleep 0.05; done\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let mut classifier = SubprocessClassifier::spawn(&script, dir.path(), vocabulary())
            .await
            .unwrap()
            .with_timeout(Duration::from_secs(5));

        let classification = classifier.classify(b"jpeg").await.unwrap();
        assert_eq!(classification.label, "person");
        assert!((classification.score - 0.75).abs() < f32::EPSILON);
    }
}
