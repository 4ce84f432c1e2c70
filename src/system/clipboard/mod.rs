//! Clipboard writing and simulated paste.

mod paste;

pub use paste::{AutoPaster, KeystrokePaster};

use std::sync::Mutex;

use arboard::Clipboard;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to write clipboard: {0}")]
    Write(String),
    #[error("Accessibility permission required to paste")]
    NotTrusted,
    #[error("Failed to paste: {0}")]
    Paste(String),
}

pub trait ClipboardWriter: Send + Sync {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// The system clipboard through `arboard`.
///
/// The handle is kept for the life of the agent: on X11 the clipboard contents are served by the
/// owning process and vanish when the handle drops.
#[derive(Default)]
pub struct SystemClipboard {
    handle: Mutex<Option<Clipboard>>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClipboardWriter for SystemClipboard {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut guard = self
            .handle
            .lock()
            .map_err(|_| ClipboardError::Unavailable("clipboard lock poisoned".to_string()))?;

        if guard.is_none() {
            let clipboard =
                Clipboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
            *guard = Some(clipboard);
        }

        let Some(clipboard) = guard.as_mut() else {
            return Err(ClipboardError::Unavailable("clipboard not initialized".to_string()));
        };

        if let Err(e) = clipboard.set_text(text.to_string()) {
            // Recreate on the next write; the connection may have gone stale.
            *guard = None;
            return Err(ClipboardError::Write(e.to_string()));
        }

        // Only the length; clipboard contents may be sensitive.
        debug!(len = text.len(), "Wrote text to clipboard");
        Ok(())
    }
}
