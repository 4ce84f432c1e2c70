//! Interactive region capture through an external screenshot tool.

mod temp_store;
mod tool;

pub use temp_store::{CaptureTempStore, STALE_CAPTURE_AGE};
pub use tool::{CaptureToolCommand, ScreenCaptureTool};

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

/// Why a capture produced no image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureFailure {
    #[error("Screen Recording permission denied")]
    PermissionDenied,
    #[error("Capture tool failed: {0}")]
    ToolFailed(String),
    #[error("Capture failed unexpectedly: {0}")]
    Unexpected(String),
}

/// Result of one capture attempt. The orchestrator owns the file behind `Captured`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureResult {
    Canceled,
    Captured(PathBuf),
    Failed(CaptureFailure),
}

#[async_trait]
pub trait CaptureService: Send + Sync {
    /// Lets the user select a region and writes it to a fresh file.
    async fn capture_region(&self) -> CaptureResult;
}

const PERMISSION_MARKERS: &[&str] = &[
    "screen recording",
    "not authorized",
    "not permitted",
    "permission denied",
    "denied by tcc",
];

fn is_permission_denied(stderr: &str) -> bool {
    let normalized = stderr.to_lowercase();
    PERMISSION_MARKERS
        .iter()
        .any(|marker| normalized.contains(marker))
}

/// Classifies a tool run that was neither a success nor a user cancel.
pub fn classify_failure(tool: &str, exit_code: i32, stderr: &str) -> CaptureFailure {
    let stderr = stderr.trim();
    if is_permission_denied(stderr) {
        CaptureFailure::PermissionDenied
    } else if !stderr.is_empty() {
        CaptureFailure::ToolFailed(stderr.to_string())
    } else {
        CaptureFailure::Unexpected(format!("{tool} failed with exit code {exit_code}"))
    }
}
