//! User-facing feedback: short confirmation toasts and "grant access" prompts.
//!
//! Rendering is left to the platform shell; [`LogNotifier`] reports through tracing.

use tracing::info;

use crate::permissions::PromptKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toast {
    Copied,
    NoText,
    CaptureFailed,
    Error,
}

impl Toast {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Copied => "Copied!",
            Self::NoText => "No text",
            Self::CaptureFailed => "Capture failed",
            Self::Error => "Error",
        }
    }
}

pub trait Notifier: Send + Sync {
    fn toast(&self, toast: Toast);
    /// Tells the user where to grant a missing permission.
    fn permission_prompt(&self, kind: PromptKind);
}

fn settings_pane(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::ScreenRecording => {
            "x-apple.systempreferences:com.apple.preference.security?Privacy_ScreenCapture"
        }
        PromptKind::Accessibility => {
            "x-apple.systempreferences:com.apple.preference.security?Privacy_Accessibility"
        }
    }
}

fn prompt_text(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::ScreenRecording => {
            "Enable Screen Recording to use Text Shot (System Settings -> Privacy & Security -> Screen Recording)"
        }
        PromptKind::Accessibility => {
            "Enable Accessibility to allow auto-paste (System Settings -> Privacy & Security -> Accessibility)"
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn toast(&self, toast: Toast) {
        info!(toast = toast.message(), "Feedback");
    }

    fn permission_prompt(&self, kind: PromptKind) {
        info!(
            kind = kind.as_str(),
            pane = settings_pane(kind),
            "{}",
            prompt_text(kind)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toast_messages() {
        assert_eq!(Toast::Copied.message(), "Copied!");
        assert_eq!(Toast::NoText.message(), "No text");
        assert_eq!(Toast::CaptureFailed.message(), "Capture failed");
        assert_eq!(Toast::Error.message(), "Error");
    }

    #[test]
    fn test_prompt_panes_differ() {
        assert_ne!(
            settings_pane(PromptKind::ScreenRecording),
            settings_pane(PromptKind::Accessibility)
        );
    }
}
