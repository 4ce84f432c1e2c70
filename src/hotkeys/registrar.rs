//! OS shortcut registration through `global-hotkey`.
//!
//! The manager must be created and used on the main thread; on macOS press events are only
//! delivered while that thread's run loop is serviced.

use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::{HotkeyError, HotkeyRegistrar, KeyToken, Modifier, ShortcutDescriptor};
use crate::actions::AppEvent;

pub struct GlobalHotkeyRegistrar {
    manager: GlobalHotKeyManager,
}

impl GlobalHotkeyRegistrar {
    pub fn new() -> Result<Self, HotkeyError> {
        let manager = GlobalHotKeyManager::new().map_err(|e| HotkeyError::Registration {
            shortcut: String::new(),
            reason: format!("Failed to create hotkey manager: {e}"),
        })?;
        Ok(Self { manager })
    }
}

fn primary_modifier() -> Modifiers {
    #[cfg(target_os = "macos")]
    {
        Modifiers::SUPER
    }
    #[cfg(not(target_os = "macos"))]
    {
        Modifiers::CONTROL
    }
}

fn to_modifiers(shortcut: &ShortcutDescriptor) -> Option<Modifiers> {
    let mut modifiers = Modifiers::empty();
    for modifier in shortcut.modifiers() {
        modifiers |= match modifier {
            Modifier::Command => primary_modifier(),
            Modifier::Control => Modifiers::CONTROL,
            Modifier::Alt => Modifiers::ALT,
            Modifier::Shift => Modifiers::SHIFT,
        };
    }
    if modifiers.is_empty() {
        None
    } else {
        Some(modifiers)
    }
}

fn letter_code(c: char) -> Option<Code> {
    Some(match c {
        'A' => Code::KeyA,
        'B' => Code::KeyB,
        'C' => Code::KeyC,
        'D' => Code::KeyD,
        'E' => Code::KeyE,
        'F' => Code::KeyF,
        'G' => Code::KeyG,
        'H' => Code::KeyH,
        'I' => Code::KeyI,
        'J' => Code::KeyJ,
        'K' => Code::KeyK,
        'L' => Code::KeyL,
        'M' => Code::KeyM,
        'N' => Code::KeyN,
        'O' => Code::KeyO,
        'P' => Code::KeyP,
        'Q' => Code::KeyQ,
        'R' => Code::KeyR,
        'S' => Code::KeyS,
        'T' => Code::KeyT,
        'U' => Code::KeyU,
        'V' => Code::KeyV,
        'W' => Code::KeyW,
        'X' => Code::KeyX,
        'Y' => Code::KeyY,
        'Z' => Code::KeyZ,
        _ => return None,
    })
}

fn digit_code(d: u8) -> Option<Code> {
    Some(match d {
        0 => Code::Digit0,
        1 => Code::Digit1,
        2 => Code::Digit2,
        3 => Code::Digit3,
        4 => Code::Digit4,
        5 => Code::Digit5,
        6 => Code::Digit6,
        7 => Code::Digit7,
        8 => Code::Digit8,
        9 => Code::Digit9,
        _ => return None,
    })
}

fn function_code(n: u8) -> Option<Code> {
    Some(match n {
        1 => Code::F1,
        2 => Code::F2,
        3 => Code::F3,
        4 => Code::F4,
        5 => Code::F5,
        6 => Code::F6,
        7 => Code::F7,
        8 => Code::F8,
        9 => Code::F9,
        10 => Code::F10,
        11 => Code::F11,
        12 => Code::F12,
        13 => Code::F13,
        14 => Code::F14,
        15 => Code::F15,
        16 => Code::F16,
        17 => Code::F17,
        18 => Code::F18,
        19 => Code::F19,
        20 => Code::F20,
        21 => Code::F21,
        22 => Code::F22,
        23 => Code::F23,
        24 => Code::F24,
        _ => return None,
    })
}

fn to_code(key: KeyToken) -> Option<Code> {
    match key {
        KeyToken::Letter(c) => letter_code(c),
        KeyToken::Digit(d) => digit_code(d),
        KeyToken::Function(n) => function_code(n),
        KeyToken::Space => Some(Code::Space),
        KeyToken::Tab => Some(Code::Tab),
        KeyToken::Enter => Some(Code::Enter),
        KeyToken::Escape => Some(Code::Escape),
        KeyToken::Backspace => Some(Code::Backspace),
        KeyToken::Delete => Some(Code::Delete),
        KeyToken::Up => Some(Code::ArrowUp),
        KeyToken::Down => Some(Code::ArrowDown),
        KeyToken::Left => Some(Code::ArrowLeft),
        KeyToken::Right => Some(Code::ArrowRight),
        KeyToken::Home => Some(Code::Home),
        KeyToken::End => Some(Code::End),
        KeyToken::PageUp => Some(Code::PageUp),
        KeyToken::PageDown => Some(Code::PageDown),
    }
}

fn to_hotkey(shortcut: &ShortcutDescriptor) -> Result<HotKey, HotkeyError> {
    let code = to_code(shortcut.key())
        .ok_or_else(|| HotkeyError::UnsupportedKey(shortcut.key().to_string()))?;
    Ok(HotKey::new(to_modifiers(shortcut), code))
}

impl HotkeyRegistrar for GlobalHotkeyRegistrar {
    fn register(&mut self, shortcut: &ShortcutDescriptor) -> Result<u32, HotkeyError> {
        let hotkey = to_hotkey(shortcut)?;
        self.manager
            .register(hotkey)
            .map_err(|e| HotkeyError::Registration {
                shortcut: shortcut.accelerator(),
                reason: e.to_string(),
            })?;
        debug!(shortcut = %shortcut, id = hotkey.id(), "Registered OS shortcut");
        Ok(hotkey.id())
    }

    fn unregister(&mut self, shortcut: &ShortcutDescriptor) -> Result<(), HotkeyError> {
        let hotkey = to_hotkey(shortcut)?;
        self.manager
            .unregister(hotkey)
            .map_err(|e| HotkeyError::Registration {
                shortcut: shortcut.accelerator(),
                reason: e.to_string(),
            })
    }
}

/// Stands in when the platform offers no global shortcut service (e.g. no X11 display); every
/// registration fails so the agent stays reachable through the action socket only.
pub struct DisabledRegistrar {
    reason: String,
}

impl DisabledRegistrar {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl HotkeyRegistrar for DisabledRegistrar {
    fn register(&mut self, shortcut: &ShortcutDescriptor) -> Result<u32, HotkeyError> {
        Err(HotkeyError::Registration {
            shortcut: shortcut.accelerator(),
            reason: self.reason.clone(),
        })
    }

    fn unregister(&mut self, _shortcut: &ShortcutDescriptor) -> Result<(), HotkeyError> {
        Ok(())
    }
}

/// Routes key-down events for any registered shortcut into the agent's event channel.
pub fn forward_hotkey_events(events: UnboundedSender<AppEvent>) {
    GlobalHotKeyEvent::set_event_handler(Some(move |event: GlobalHotKeyEvent| {
        if event.state != HotKeyState::Pressed {
            return;
        }
        if events.send(AppEvent::HotkeyPressed(event.id)).is_err() {
            warn!("Event loop closed; dropping hotkey press");
        }
    }));
}
