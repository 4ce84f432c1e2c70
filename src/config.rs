//! Persistent settings shared by the agent and the settings editor.
//!
//! Persists settings in a JSON file: `<config dir>/Text Shot/settings-v2.json`.
//! Loading fills every missing or unparseable field with its default and upgrades older schema
//! versions through [`SCHEMA_UPGRADES`]. Saving writes a sibling temp file and renames it over the
//! target, so a concurrent reader sees either the old or the new file, never a partial one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::hotkeys::ShortcutDescriptor;

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Files without `schemaVersion` predate versioning.
const UNVERSIONED_SCHEMA: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No config directory available on this platform")]
    NoConfigDir,
    #[error("Failed to replace settings file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub hotkey: ShortcutDescriptor,
    pub show_confirmation: bool,
    pub launch_at_login: bool,
    pub auto_paste: bool,
    pub debug_mode: bool,
    /// Epoch milliseconds; 0 means never shown.
    pub last_permission_prompt_at: i64,
    pub last_accessibility_prompt_at: i64,
    pub schema_version: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hotkey: ShortcutDescriptor::default(),
            show_confirmation: true,
            launch_at_login: false,
            auto_paste: false,
            debug_mode: false,
            last_permission_prompt_at: 0,
            last_accessibility_prompt_at: 0,
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }
}

impl Settings {
    fn normalized(mut self) -> Self {
        self.schema_version = CURRENT_SCHEMA_VERSION;
        self.last_permission_prompt_at = self.last_permission_prompt_at.max(0);
        self.last_accessibility_prompt_at = self.last_accessibility_prompt_at.max(0);
        self
    }
}

/// Any value that does not deserialize as `T` is treated as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    #[serde(default, deserialize_with = "lenient")]
    hotkey: Option<ShortcutDescriptor>,
    #[serde(default, deserialize_with = "lenient")]
    show_confirmation: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    launch_at_login: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    auto_paste: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    debug_mode: Option<bool>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    last_permission_prompt_at: Option<i64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    last_accessibility_prompt_at: Option<i64>,
}

impl From<RawSettings> for Settings {
    fn from(raw: RawSettings) -> Self {
        let defaults = Settings::default();
        Settings {
            hotkey: raw.hotkey.unwrap_or(defaults.hotkey),
            show_confirmation: raw.show_confirmation.unwrap_or(defaults.show_confirmation),
            launch_at_login: raw.launch_at_login.unwrap_or(defaults.launch_at_login),
            auto_paste: raw.auto_paste.unwrap_or(defaults.auto_paste),
            debug_mode: raw.debug_mode.unwrap_or(defaults.debug_mode),
            last_permission_prompt_at: raw
                .last_permission_prompt_at
                .unwrap_or(defaults.last_permission_prompt_at),
            last_accessibility_prompt_at: raw
                .last_accessibility_prompt_at
                .unwrap_or(defaults.last_accessibility_prompt_at),
            schema_version: CURRENT_SCHEMA_VERSION,
        }
        .normalized()
    }
}

// --- Schema upgrades ---

type UpgradeStep = fn(&mut Map<String, Value>);

/// `(from_version, step)`; each step brings a document from `from_version` to `from_version + 1`.
pub const SCHEMA_UPGRADES: &[(u32, UpgradeStep)] = &[(1, upgrade_v1_to_v2)];

/// Unversioned files stored the hotkey with surrounding whitespace (or blank for "unset") and
/// could hold fractional timestamps.
fn upgrade_v1_to_v2(doc: &mut Map<String, Value>) {
    if let Some(Value::String(hotkey)) = doc.get("hotkey") {
        let trimmed = hotkey.trim().to_string();
        if trimmed.is_empty() {
            doc.remove("hotkey");
        } else {
            doc.insert("hotkey".to_string(), Value::String(trimmed));
        }
    }
    for key in ["lastPermissionPromptAt", "lastAccessibilityPromptAt"] {
        if let Some(rounded) = doc
            .get(key)
            .and_then(Value::as_f64)
            .filter(|f| f.is_finite())
            .map(|f| f.round() as i64)
        {
            doc.insert(key.to_string(), Value::from(rounded));
        }
    }
}

fn schema_version_of(doc: &Map<String, Value>) -> u32 {
    doc.get("schemaVersion")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(UNVERSIONED_SCHEMA)
}

fn upgrade_document(doc: &mut Map<String, Value>) {
    let mut version = schema_version_of(doc);
    for (from, step) in SCHEMA_UPGRADES {
        if version == *from {
            debug!(from = *from, to = *from + 1, "Upgrading settings schema");
            step(doc);
            version = *from + 1;
        }
    }
    doc.insert("schemaVersion".to_string(), Value::from(version));
}

/// Builds settings from an arbitrary JSON value, upgrading and default-filling as needed.
pub fn settings_from_value(value: Value) -> Settings {
    let mut doc = match value {
        Value::Object(map) => map,
        other => {
            warn!(kind = ?other, "Settings document is not an object, using defaults");
            Map::new()
        }
    };
    upgrade_document(&mut doc);
    serde_json::from_value::<RawSettings>(Value::Object(doc))
        .unwrap_or_default()
        .into()
}

pub fn parse_settings(data: &str) -> Result<Settings, ConfigError> {
    let value: Value = serde_json::from_str(data)?;
    Ok(settings_from_value(value))
}

// --- Store ---

/// Reads and atomically writes one settings file.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_load(&self) -> Result<Settings, ConfigError> {
        let data = fs::read_to_string(&self.path)?;
        let settings = parse_settings(&data)?;
        debug!(path = ?self.path, "Settings loaded");
        Ok(settings)
    }

    /// Current settings, or defaults when the file is missing or unreadable.
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(settings) => settings,
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "Settings file does not exist, using defaults");
                Settings::default()
            }
            Err(err) => {
                warn!(error = %err, path = ?self.path, "Failed to load settings, using defaults");
                Settings::default()
            }
        }
    }

    /// Writes `settings` atomically and returns what was written.
    pub fn save(&self, settings: &Settings) -> Result<Settings, ConfigError> {
        let next = settings.clone().normalized();
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(parent)?;

        let mut data = serde_json::to_string_pretty(&next)?;
        data.push('\n');

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(data.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        debug!(path = ?self.path, "Settings saved");
        Ok(next)
    }

    /// Load, mutate, save. Write errors propagate.
    pub fn update<F>(&self, mutate: F) -> Result<Settings, ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut current = self.load();
        mutate(&mut current);
        self.save(&current)
    }
}
