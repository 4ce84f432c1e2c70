//! Paste into the frontmost application by simulating the paste shortcut.
//!
//! macOS sends Cmd+V through AppleScript after an Accessibility preflight that never prompts;
//! prompting is left to the caller's throttled dialog. Elsewhere `enigo` sends Ctrl+V.

use async_trait::async_trait;
use tracing::debug;

use super::ClipboardError;

#[async_trait]
pub trait AutoPaster: Send + Sync {
    async fn paste(&self) -> Result<(), ClipboardError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct KeystrokePaster;

#[cfg(target_os = "macos")]
const PASTE_SCRIPT: &str = r#"tell application "System Events" to keystroke "v" using command down"#;

#[cfg(target_os = "macos")]
#[async_trait]
impl AutoPaster for KeystrokePaster {
    async fn paste(&self) -> Result<(), ClipboardError> {
        use macos_accessibility_client::accessibility::application_is_trusted;

        if !application_is_trusted() {
            return Err(ClipboardError::NotTrusted);
        }

        debug!("Simulating Cmd+V via AppleScript");
        let output = tokio::process::Command::new("osascript")
            .arg("-e")
            .arg(PASTE_SCRIPT)
            .output()
            .await
            .map_err(|e| ClipboardError::Paste(format!("Failed to execute osascript: {e}")))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not allowed to send keystrokes") || stderr.contains("-1002") {
            return Err(ClipboardError::NotTrusted);
        }
        Err(ClipboardError::Paste(if stderr.trim().is_empty() {
            format!(
                "AppleScript failed with exit code {}",
                output.status.code().unwrap_or(-1)
            )
        } else {
            stderr.trim().to_string()
        }))
    }
}

#[cfg(not(target_os = "macos"))]
fn simulate_ctrl_v() -> Result<(), String> {
    use enigo::{Direction, Enigo, Key, Keyboard, Settings};

    let mut enigo = Enigo::new(&Settings::default()).map_err(|e| e.to_string())?;
    enigo
        .key(Key::Control, Direction::Press)
        .map_err(|e| e.to_string())?;
    let clicked = enigo
        .key(Key::Unicode('v'), Direction::Click)
        .map_err(|e| e.to_string());
    enigo
        .key(Key::Control, Direction::Release)
        .map_err(|e| e.to_string())?;
    clicked
}

#[cfg(not(target_os = "macos"))]
#[async_trait]
impl AutoPaster for KeystrokePaster {
    async fn paste(&self) -> Result<(), ClipboardError> {
        debug!("Simulating Ctrl+V via enigo");
        tokio::task::spawn_blocking(simulate_ctrl_v)
            .await
            .map_err(|e| ClipboardError::Paste(e.to_string()))?
            .map_err(ClipboardError::Paste)
    }
}
