//! User-triggerable actions and the events that drive the agent loop.
//!
//! Actions arrive from the global shortcut, the action socket (`text-shot action capture`), or
//! `TEXT_SHOT_START_ACTION` carried into a freshly started agent.

/// Action that can be requested from outside the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Capture,
    OpenSettings,
    Quit,
}

impl AppAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::OpenSettings => "settings",
            Self::Quit => "quit",
        }
    }
}

/// Where a capture request came from. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Hotkey,
    Socket,
    Startup,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hotkey => "hotkey",
            Self::Socket => "socket",
            Self::Startup => "startup",
        }
    }
}

/// Everything the agent loop reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Key-down of a registered shortcut, by registration id.
    HotkeyPressed(u32),
    Action(AppAction, TriggerSource),
    /// The settings file changed and the burst has settled.
    SettingsFileChanged,
    /// The settings editor process with this pid ended.
    EditorExited { pid: u32 },
}

/// Parses an action string (e.g. from the socket or TEXT_SHOT_START_ACTION).
pub fn parse_app_action(raw: &str) -> Option<AppAction> {
    match raw.trim().to_lowercase().as_str() {
        "capture" | "capture-text" | "capture_text" | "shot" => Some(AppAction::Capture),
        "settings" | "open-settings" | "open_settings" | "preferences" => {
            Some(AppAction::OpenSettings)
        }
        "quit" | "exit" => Some(AppAction::Quit),
        _ => None,
    }
}
