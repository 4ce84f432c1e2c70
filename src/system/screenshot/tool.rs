//! Capture through a command-line screenshot tool (`screencapture -i -x <path>` on macOS).
//!
//! Exit code 1 is the user pressing Escape during region selection. Exit code 0 with the output
//! file present is a capture. Anything else is classified from stderr.

use std::env;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::{classify_failure, CaptureFailure, CaptureResult, CaptureService, CaptureTempStore};

const CAPTURE_TOOL_ENV: &str = "TEXT_SHOT_CAPTURE_TOOL";
const EXIT_CANCELED: i32 = 1;

/// Program and leading arguments; the output path is appended as the last argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CaptureToolCommand {
    /// Parses `program arg arg` as found in `TEXT_SHOT_CAPTURE_TOOL`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// The environment override, else the platform's interactive capture tool.
    pub fn platform_default() -> Option<Self> {
        if let Some(cmd) = env::var(CAPTURE_TOOL_ENV)
            .ok()
            .and_then(|raw| Self::parse(&raw))
        {
            return Some(cmd);
        }

        #[cfg(target_os = "macos")]
        {
            Some(Self {
                program: "/usr/sbin/screencapture".to_string(),
                args: vec!["-i".to_string(), "-x".to_string()],
            })
        }
        #[cfg(not(target_os = "macos"))]
        {
            None
        }
    }

    fn tool_name(&self) -> &str {
        Path::new(&self.program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.program)
    }
}

pub struct ScreenCaptureTool {
    command: Option<CaptureToolCommand>,
    temp: CaptureTempStore,
}

impl ScreenCaptureTool {
    pub fn new(command: Option<CaptureToolCommand>, temp: CaptureTempStore) -> Self {
        Self { command, temp }
    }
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(error = %e, path = %path.display(), "Failed to remove partial capture file");
        }
    }
}

#[async_trait]
impl CaptureService for ScreenCaptureTool {
    async fn capture_region(&self) -> CaptureResult {
        let Some(command) = &self.command else {
            return CaptureResult::Failed(CaptureFailure::Unexpected(format!(
                "No capture tool available on this platform; set {CAPTURE_TOOL_ENV}"
            )));
        };

        let output_path = match self.temp.new_capture_path() {
            Ok(path) => path,
            Err(e) => {
                return CaptureResult::Failed(CaptureFailure::Unexpected(format!(
                    "Failed to prepare capture file: {e}"
                )))
            }
        };

        debug!(path = %output_path.display(), tool = %command.program, "Starting interactive region selection");

        let output = Command::new(&command.program)
            .args(&command.args)
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                remove_partial(&output_path);
                error!(error = %e, tool = %command.program, "Failed to execute capture tool");
                return CaptureResult::Failed(CaptureFailure::Unexpected(format!(
                    "Failed to execute {}: {e}",
                    command.program
                )));
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code == 0 && output_path.is_file() {
            info!(path = %output_path.display(), "Region captured");
            return CaptureResult::Captured(output_path);
        }

        remove_partial(&output_path);

        if exit_code == EXIT_CANCELED {
            debug!("User cancelled region selection");
            return CaptureResult::Canceled;
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let failure = classify_failure(command.tool_name(), exit_code, &stderr);
        error!(code = exit_code, error = %failure, "Region capture failed");
        CaptureResult::Failed(failure)
    }
}
