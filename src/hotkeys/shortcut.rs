//! Keyboard shortcut descriptors and their accelerator text form.
//!
//! `CommandOrControl+Alt+Shift+2` style strings are parsed case-insensitively and always
//! formatted back with modifiers in canonical order. In the settings file a shortcut is written as
//! an accelerator string but may also be read as `{ "modifiers": [...], "key": "..." }`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::HotkeyError;

pub const DEFAULT_ACCELERATOR: &str = "CommandOrControl+Shift+2";

/// Declaration order is the canonical accelerator order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modifier {
    /// Cmd on macOS, Ctrl elsewhere.
    Command,
    Control,
    Alt,
    Shift,
}

impl Modifier {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "commandorcontrol" | "cmdorctrl" | "commandorctrl" | "cmdorcontrol" | "command"
            | "cmd" | "super" | "meta" => Some(Self::Command),
            "control" | "ctrl" => Some(Self::Control),
            "alt" | "option" => Some(Self::Alt),
            "shift" => Some(Self::Shift),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Command => "CommandOrControl",
            Self::Control => "Control",
            Self::Alt => "Alt",
            Self::Shift => "Shift",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyToken {
    /// Uppercase ASCII letter.
    Letter(char),
    Digit(u8),
    /// F1 through F24.
    Function(u8),
    Space,
    Tab,
    Enter,
    Escape,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
}

impl KeyToken {
    pub fn parse(raw: &str) -> Result<Self, HotkeyError> {
        let upper = raw.trim().to_uppercase();
        let unsupported = || HotkeyError::UnsupportedKey(raw.trim().to_string());

        let mut chars = upper.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return match c {
                'A'..='Z' => Ok(Self::Letter(c)),
                '0'..='9' => Ok(Self::Digit(c as u8 - b'0')),
                _ => Err(unsupported()),
            };
        }

        if let Some(number) = upper.strip_prefix('F') {
            if let Ok(n) = number.parse::<u8>() {
                return if (1..=24).contains(&n) {
                    Ok(Self::Function(n))
                } else {
                    Err(unsupported())
                };
            }
        }

        match upper.as_str() {
            "SPACE" => Ok(Self::Space),
            "TAB" => Ok(Self::Tab),
            "ENTER" | "RETURN" => Ok(Self::Enter),
            "ESCAPE" | "ESC" => Ok(Self::Escape),
            "BACKSPACE" => Ok(Self::Backspace),
            "DELETE" | "DEL" => Ok(Self::Delete),
            "UP" | "ARROWUP" => Ok(Self::Up),
            "DOWN" | "ARROWDOWN" => Ok(Self::Down),
            "LEFT" | "ARROWLEFT" => Ok(Self::Left),
            "RIGHT" | "ARROWRIGHT" => Ok(Self::Right),
            "HOME" => Ok(Self::Home),
            "END" => Ok(Self::End),
            "PAGEUP" | "PGUP" => Ok(Self::PageUp),
            "PAGEDOWN" | "PGDN" => Ok(Self::PageDown),
            _ => Err(unsupported()),
        }
    }

    pub fn is_function_key(&self) -> bool {
        matches!(self, Self::Function(_))
    }
}

impl fmt::Display for KeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Letter(c) => write!(f, "{c}"),
            Self::Digit(d) => write!(f, "{d}"),
            Self::Function(n) => write!(f, "F{n}"),
            Self::Space => f.write_str("Space"),
            Self::Tab => f.write_str("Tab"),
            Self::Enter => f.write_str("Enter"),
            Self::Escape => f.write_str("Escape"),
            Self::Backspace => f.write_str("Backspace"),
            Self::Delete => f.write_str("Delete"),
            Self::Up => f.write_str("Up"),
            Self::Down => f.write_str("Down"),
            Self::Left => f.write_str("Left"),
            Self::Right => f.write_str("Right"),
            Self::Home => f.write_str("Home"),
            Self::End => f.write_str("End"),
            Self::PageUp => f.write_str("PageUp"),
            Self::PageDown => f.write_str("PageDown"),
        }
    }
}

/// A validated shortcut: at least one modifier, or a bare function key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShortcutDescriptor {
    modifiers: BTreeSet<Modifier>,
    key: KeyToken,
}

impl ShortcutDescriptor {
    pub fn new(
        modifiers: impl IntoIterator<Item = Modifier>,
        key: KeyToken,
    ) -> Result<Self, HotkeyError> {
        let modifiers: BTreeSet<Modifier> = modifiers.into_iter().collect();
        if modifiers.is_empty() && !key.is_function_key() {
            return Err(HotkeyError::InvalidShortcut(format!(
                "{key} needs at least one modifier"
            )));
        }
        Ok(Self { modifiers, key })
    }

    pub fn parse(raw: &str) -> Result<Self, HotkeyError> {
        let tokens: Vec<&str> = raw.split('+').map(str::trim).collect();
        if tokens.iter().any(|t| t.is_empty()) {
            return Err(HotkeyError::InvalidShortcut(raw.to_string()));
        }
        let Some((key, modifier_tokens)) = tokens.split_last() else {
            return Err(HotkeyError::InvalidShortcut(raw.to_string()));
        };

        let mut modifiers = BTreeSet::new();
        for token in modifier_tokens {
            let modifier = Modifier::parse(token)
                .ok_or_else(|| HotkeyError::UnsupportedModifier(token.to_string()))?;
            modifiers.insert(modifier);
        }
        Self::new(modifiers, KeyToken::parse(key)?)
    }

    pub fn modifiers(&self) -> impl Iterator<Item = Modifier> + '_ {
        self.modifiers.iter().copied()
    }

    pub fn key(&self) -> KeyToken {
        self.key
    }

    pub fn accelerator(&self) -> String {
        self.to_string()
    }
}

impl Default for ShortcutDescriptor {
    fn default() -> Self {
        Self {
            modifiers: BTreeSet::from([Modifier::Command, Modifier::Shift]),
            key: KeyToken::Digit(2),
        }
    }
}

impl fmt::Display for ShortcutDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{}+", modifier.label())?;
        }
        write!(f, "{}", self.key)
    }
}

impl FromStr for ShortcutDescriptor {
    type Err = HotkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ShortcutDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.accelerator())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawShortcut {
    Accelerator(String),
    Structured { modifiers: Vec<String>, key: String },
}

impl<'de> Deserialize<'de> for ShortcutDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parsed = match RawShortcut::deserialize(deserializer)? {
            RawShortcut::Accelerator(raw) => Self::parse(&raw),
            RawShortcut::Structured { modifiers, key } => modifiers
                .iter()
                .map(|m| {
                    Modifier::parse(m).ok_or_else(|| HotkeyError::UnsupportedModifier(m.clone()))
                })
                .collect::<Result<Vec<_>, _>>()
                .and_then(|mods| Self::new(mods, KeyToken::parse(&key)?)),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_accelerator() {
        assert_eq!(ShortcutDescriptor::default().accelerator(), DEFAULT_ACCELERATOR);
        assert_eq!(
            ShortcutDescriptor::parse(DEFAULT_ACCELERATOR).unwrap(),
            ShortcutDescriptor::default()
        );
    }

    #[test]
    fn test_parse_aliases_and_canonical_order() {
        let shortcut = ShortcutDescriptor::parse("shift + option + cmd + k").unwrap();
        assert_eq!(shortcut.accelerator(), "CommandOrControl+Alt+Shift+K");

        let shortcut = ShortcutDescriptor::parse("Ctrl+Super+pgdn").unwrap();
        assert_eq!(shortcut.accelerator(), "CommandOrControl+Control+PageDown");
    }

    #[test]
    fn test_bare_key_requires_function_key() {
        assert!(matches!(
            ShortcutDescriptor::parse("A"),
            Err(HotkeyError::InvalidShortcut(_))
        ));
        assert_eq!(ShortcutDescriptor::parse("f9").unwrap().accelerator(), "F9");
    }

    #[test]
    fn test_rejects_unknown_tokens() {
        assert!(matches!(
            ShortcutDescriptor::parse("Hyper+A"),
            Err(HotkeyError::UnsupportedModifier(_))
        ));
        assert!(matches!(
            ShortcutDescriptor::parse("Shift+F25"),
            Err(HotkeyError::UnsupportedKey(_))
        ));
        assert!(matches!(
            ShortcutDescriptor::parse("Shift+"),
            Err(HotkeyError::InvalidShortcut(_))
        ));
        assert!(ShortcutDescriptor::parse("").is_err());
    }

    #[test]
    fn test_serde_accepts_string_and_structured() {
        let from_string: ShortcutDescriptor =
            serde_json::from_str(r#""Alt+Shift+Space""#).unwrap();
        let from_object: ShortcutDescriptor =
            serde_json::from_str(r#"{"modifiers":["shift","option"],"key":"space"}"#).unwrap();
        assert_eq!(from_string, from_object);
        assert_eq!(
            serde_json::to_string(&from_object).unwrap(),
            r#""Alt+Shift+Space""#
        );
    }
}
