//! Recognition through the bundled `ocr-helper` executable.
//!
//! The helper wraps the platform text recognizer and is invoked once per attempt:
//! `ocr-helper --input <path> --level accurate|fast --language-correction on|off`.
//! Exit code 0 prints one recognized line per stdout line, exit code 10 means no text, anything
//! else is a failure described on stderr.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error};

use super::{OcrAttemptSpec, OcrError, RecognitionService};
use crate::paths;

const HELPER_NAME: &str = "ocr-helper";
const HELPER_ENV: &str = "TEXT_SHOT_OCR_HELPER";

const EXIT_SUCCESS: i32 = 0;
const EXIT_NO_TEXT: i32 = 10;

pub struct HelperRecognizer {
    helper: Option<PathBuf>,
}

impl HelperRecognizer {
    /// Uses the helper found by [`paths::find_companion_binary`].
    pub fn discover() -> Self {
        let helper = paths::find_companion_binary(HELPER_NAME, HELPER_ENV);
        match &helper {
            Some(path) => debug!(path = %path.display(), "Using OCR helper"),
            None => debug!("OCR helper not found; recognition will fail until it is installed"),
        }
        Self { helper }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            helper: Some(path.into()),
        }
    }
}

fn helper_args(image: &Path, attempt: OcrAttemptSpec) -> Vec<String> {
    vec![
        "--input".to_string(),
        image.to_string_lossy().into_owned(),
        "--level".to_string(),
        attempt.level.as_str().to_string(),
        "--language-correction".to_string(),
        if attempt.language_correction { "on" } else { "off" }.to_string(),
    ]
}

fn parse_lines(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[async_trait]
impl RecognitionService for HelperRecognizer {
    async fn recognize(
        &self,
        image: &Path,
        attempt: OcrAttemptSpec,
    ) -> Result<Vec<String>, OcrError> {
        let helper = self.helper.as_ref().ok_or_else(|| {
            OcrError::HelperNotFound(format!(
                "{HELPER_NAME} is not installed; set {HELPER_ENV} to its path"
            ))
        })?;

        let output = Command::new(helper)
            .args(helper_args(image, attempt))
            .output()
            .await
            .map_err(|e| OcrError::Service(format!("Failed to execute {HELPER_NAME}: {e}")))?;

        let code = output.status.code().unwrap_or(-1);
        match code {
            EXIT_SUCCESS => {
                let lines = parse_lines(&output.stdout);
                debug!(lines = lines.len(), level = %attempt.level, "Helper recognized lines");
                Ok(lines)
            }
            EXIT_NO_TEXT => Ok(Vec::new()),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let message = if stderr.trim().is_empty() {
                    format!("{HELPER_NAME} failed with code {code}")
                } else {
                    stderr.trim().to_string()
                };
                error!(code, stderr = %stderr.trim(), "Text extraction failed");
                Err(OcrError::Service(message))
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::system::ocr::RETRY_CHAIN;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("ocr-helper");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_helper_args() {
        let args = helper_args(Path::new("/tmp/a.png"), RETRY_CHAIN[1]);
        assert_eq!(
            args,
            [
                "--input",
                "/tmp/a.png",
                "--level",
                "accurate",
                "--language-correction",
                "off"
            ]
        );
    }

    #[tokio::test]
    async fn test_success_returns_trimmed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let helper = script(dir.path(), "printf 'first  \\n\\n second\\n'");
        let recognizer = HelperRecognizer::with_path(helper);

        let lines = recognizer
            .recognize(Path::new("/tmp/x.png"), RETRY_CHAIN[0])
            .await
            .unwrap();
        assert_eq!(lines, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn test_exit_ten_is_no_text() {
        let dir = tempfile::tempdir().unwrap();
        let helper = script(dir.path(), "exit 10");
        let recognizer = HelperRecognizer::with_path(helper);

        let lines = recognizer
            .recognize(Path::new("/tmp/x.png"), RETRY_CHAIN[2])
            .await
            .unwrap();
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn test_other_exit_is_service_error() {
        let dir = tempfile::tempdir().unwrap();
        let helper = script(dir.path(), "echo 'OCR error: boom' >&2; exit 30");
        let recognizer = HelperRecognizer::with_path(helper);

        let err = recognizer
            .recognize(Path::new("/tmp/x.png"), RETRY_CHAIN[0])
            .await
            .unwrap_err();
        match err {
            OcrError::Service(message) => assert_eq!(message, "OCR error: boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_helper() {
        let recognizer = HelperRecognizer { helper: None };
        let err = recognizer
            .recognize(Path::new("/tmp/x.png"), RETRY_CHAIN[0])
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::HelperNotFound(_)));
    }
}
