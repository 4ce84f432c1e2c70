//! OCR (Optical Character Recognition) with a fixed quality-first retry chain.
//!
//! The recognizer itself is opaque: anything implementing [`RecognitionService`] can be plugged
//! in. [`OcrEngine`] walks [`RETRY_CHAIN`] from the most accurate configuration to the fastest
//! and returns the first attempt that yields text after cleanup. A failing recognizer aborts the
//! chain; only empty results fall through to the next attempt.

mod helper;

pub use helper::HelperRecognizer;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::text_cleanup::cleanup_text;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Unable to read captured image: {0}")]
    UnreadableImage(String),
    #[error("OCR helper not found: {0}")]
    HelperNotFound(String),
    #[error("Recognition service error: {0}")]
    Service(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionLevel {
    Accurate,
    Fast,
}

impl RecognitionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accurate => "accurate",
            Self::Fast => "fast",
        }
    }
}

impl fmt::Display for RecognitionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recognition configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcrAttemptSpec {
    pub level: RecognitionLevel,
    pub language_correction: bool,
}

/// Attempts in the order they are tried.
pub const RETRY_CHAIN: [OcrAttemptSpec; 3] = [
    OcrAttemptSpec {
        level: RecognitionLevel::Accurate,
        language_correction: true,
    },
    OcrAttemptSpec {
        level: RecognitionLevel::Accurate,
        language_correction: false,
    },
    OcrAttemptSpec {
        level: RecognitionLevel::Fast,
        language_correction: true,
    },
];

/// External text recognizer. One call per attempt; returns recognized lines.
#[async_trait]
pub trait RecognitionService: Send + Sync {
    async fn recognize(&self, image: &Path, attempt: OcrAttemptSpec)
        -> Result<Vec<String>, OcrError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrOutcome {
    Text {
        text: String,
        level: RecognitionLevel,
    },
    NoText,
}

pub struct OcrEngine {
    service: Arc<dyn RecognitionService>,
}

impl OcrEngine {
    pub fn new(service: Arc<dyn RecognitionService>) -> Self {
        Self { service }
    }

    /// Runs the retry chain against `image`.
    pub async fn run_with_retry(&self, image: &Path) -> Result<OcrOutcome, OcrError> {
        let (width, height) = image::image_dimensions(image)
            .map_err(|e| OcrError::UnreadableImage(format!("{}: {e}", image.display())))?;
        debug!(width, height, path = %image.display(), "Starting OCR retry chain");

        for (index, attempt) in RETRY_CHAIN.iter().enumerate() {
            let lines = self.service.recognize(image, *attempt).await.map_err(|e| {
                warn!(
                    attempt = index + 1,
                    level = %attempt.level,
                    correction = attempt.language_correction,
                    error = %e,
                    "Recognition attempt failed"
                );
                e
            })?;

            let text = cleanup_text(&lines.join("\n"));
            if !text.is_empty() {
                info!(
                    attempt = index + 1,
                    level = %attempt.level,
                    chars = text.len(),
                    "OCR produced text"
                );
                return Ok(OcrOutcome::Text {
                    text,
                    level: attempt.level,
                });
            }

            debug!(
                attempt = index + 1,
                level = %attempt.level,
                correction = attempt.language_correction,
                "Recognition attempt returned no text"
            );
        }

        info!("No text found after all recognition attempts");
        Ok(OcrOutcome::NoText)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;

    pub(crate) fn write_test_png(dir: &Path) -> PathBuf {
        let path = dir.join("capture.png");
        image::RgbImage::new(4, 4)
            .save(&path)
            .expect("write test png");
        path
    }

    /// Replays scripted attempt results and records which attempts were made.
    pub(crate) struct ScriptedRecognizer {
        results: Mutex<VecDeque<Result<Vec<String>, OcrError>>>,
        pub(crate) calls: Mutex<Vec<OcrAttemptSpec>>,
    }

    impl ScriptedRecognizer {
        pub(crate) fn new(results: Vec<Result<Vec<String>, OcrError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn lines(lines: &[&str]) -> Result<Vec<String>, OcrError> {
            Ok(lines.iter().map(|s| s.to_string()).collect())
        }
    }

    #[async_trait]
    impl RecognitionService for ScriptedRecognizer {
        async fn recognize(
            &self,
            _image: &Path,
            attempt: OcrAttemptSpec,
        ) -> Result<Vec<String>, OcrError> {
            self.calls.lock().unwrap().push(attempt);
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[tokio::test]
    async fn test_first_attempt_with_text_wins() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_test_png(dir.path());
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![ScriptedRecognizer::lines(&[
            "Hello  ", "World",
        ])]));
        let engine = OcrEngine::new(recognizer.clone());

        let outcome = engine.run_with_retry(&image).await.unwrap();
        assert_eq!(
            outcome,
            OcrOutcome::Text {
                text: "Hello\nWorld".to_string(),
                level: RecognitionLevel::Accurate
            }
        );
        assert_eq!(recognizer.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_falls_through_to_fast_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_test_png(dir.path());
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![
            ScriptedRecognizer::lines(&[]),
            // Artifact-only output counts as empty.
            ScriptedRecognizer::lines(&["....", "|"]),
            ScriptedRecognizer::lines(&["fast text"]),
        ]));
        let engine = OcrEngine::new(recognizer.clone());

        let outcome = engine.run_with_retry(&image).await.unwrap();
        assert_eq!(
            outcome,
            OcrOutcome::Text {
                text: "fast text".to_string(),
                level: RecognitionLevel::Fast
            }
        );
        assert_eq!(recognizer.calls.lock().unwrap().as_slice(), &RETRY_CHAIN);
    }

    #[tokio::test]
    async fn test_all_empty_is_no_text() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_test_png(dir.path());
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![]));
        let engine = OcrEngine::new(recognizer.clone());

        assert_eq!(
            engine.run_with_retry(&image).await.unwrap(),
            OcrOutcome::NoText
        );
        assert_eq!(recognizer.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_service_failure_stops_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_test_png(dir.path());
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![
            ScriptedRecognizer::lines(&[]),
            Err(OcrError::Service("vision crashed".to_string())),
            ScriptedRecognizer::lines(&["never reached"]),
        ]));
        let engine = OcrEngine::new(recognizer.clone());

        let err = engine.run_with_retry(&image).await.unwrap_err();
        assert!(matches!(err, OcrError::Service(_)));
        assert_eq!(recognizer.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_image_is_rejected_before_any_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("not-an-image.png");
        std::fs::write(&image, b"garbage").unwrap();
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![]));
        let engine = OcrEngine::new(recognizer.clone());

        let err = engine.run_with_retry(&image).await.unwrap_err();
        assert!(matches!(err, OcrError::UnreadableImage(_)));
        assert!(recognizer.calls.lock().unwrap().is_empty());
    }
}
