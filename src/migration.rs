//! One-time upgrade from the pre-v2 settings files.
//!
//! Runs before anything reads settings. When `settings-v2.json` is missing and the
//! `.migration-v2-done` marker is not there either, the first readable legacy file is converted.
//! The marker is created afterwards so a later deletion of the v2 file yields defaults instead of
//! resurrecting old legacy values.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{self, ConfigError, Settings, SettingsStore};
use crate::paths;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The v2 file already existed.
    AlreadyCurrent,
    MigratedFrom(PathBuf),
    CreatedDefaults,
}

pub struct SettingsMigrator {
    base: PathBuf,
}

impl SettingsMigrator {
    /// `base` is the per-user config directory (see [`paths::get_config_base_dir`]).
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn from_config_dir() -> Result<Self, ConfigError> {
        let base = paths::get_config_base_dir().map_err(|_| ConfigError::NoConfigDir)?;
        Ok(Self::new(base))
    }

    /// Ensures the v2 file and the marker exist, then returns a store for the v2 file.
    pub fn prepare_store(&self) -> Result<(SettingsStore, MigrationOutcome), ConfigError> {
        fs::create_dir_all(paths::app_dir(&self.base))?;
        let target = paths::settings_file(&self.base);
        let marker = paths::migration_marker(&self.base);
        let store = SettingsStore::new(&target);

        let outcome = if target.exists() {
            MigrationOutcome::AlreadyCurrent
        } else if marker.exists() {
            debug!("Settings file missing after migration already ran, writing defaults");
            store.save(&Settings::default())?;
            MigrationOutcome::CreatedDefaults
        } else {
            match self.read_first_legacy() {
                Some((source, settings)) => {
                    store.save(&settings)?;
                    info!(from = %source.display(), "Migrated legacy settings");
                    MigrationOutcome::MigratedFrom(source)
                }
                None => {
                    store.save(&Settings::default())?;
                    MigrationOutcome::CreatedDefaults
                }
            }
        };

        if !marker.exists() {
            fs::write(&marker, b"")?;
        }

        Ok((store, outcome))
    }

    fn read_first_legacy(&self) -> Option<(PathBuf, Settings)> {
        paths::legacy_settings_candidates(&self.base)
            .into_iter()
            .filter(|candidate| candidate.is_file())
            .find_map(|candidate| match read_legacy(&candidate) {
                Ok(settings) => Some((candidate, settings)),
                Err(e) => {
                    warn!(error = %e, path = %candidate.display(), "Skipping unreadable legacy settings");
                    None
                }
            })
    }
}

fn read_legacy(path: &Path) -> Result<Settings, ConfigError> {
    let data = fs::read_to_string(path)?;
    let mut value: Value = serde_json::from_str(&data)?;
    // Legacy files carry no version even if a stray field claims one.
    if let Value::Object(map) = &mut value {
        map.remove("schemaVersion");
    }
    Ok(config::settings_from_value(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkeys::ShortcutDescriptor;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_fresh_install_creates_defaults_and_marker() {
        let dir = tempfile::tempdir().unwrap();
        let migrator = SettingsMigrator::new(dir.path());

        let (store, outcome) = migrator.prepare_store().unwrap();

        assert_eq!(outcome, MigrationOutcome::CreatedDefaults);
        assert_eq!(store.try_load().unwrap(), Settings::default());
        assert!(paths::migration_marker(dir.path()).exists());
    }

    #[test]
    fn test_legacy_file_is_migrated_with_defaults_for_bad_fields() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("text-shot").join("settings.json");
        write(
            &legacy,
            r#"{"hotkey":"Alt+Shift+T","autoPaste":true,"showConfirmation":"nope","lastPermissionPromptAt":42}"#,
        );

        let (store, outcome) = SettingsMigrator::new(dir.path()).prepare_store().unwrap();

        assert_eq!(outcome, MigrationOutcome::MigratedFrom(legacy));
        let settings = store.try_load().unwrap();
        assert_eq!(settings.hotkey, ShortcutDescriptor::parse("Alt+Shift+T").unwrap());
        assert!(settings.auto_paste);
        assert!(settings.show_confirmation);
        assert_eq!(settings.last_permission_prompt_at, 42);
    }

    #[test]
    fn test_first_legacy_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let preferred = dir.path().join("Text Shot").join("settings.json");
        write(&preferred, r#"{"debugMode":true}"#);
        write(
            &dir.path().join("text-shot").join("settings.json"),
            r#"{"autoPaste":true}"#,
        );

        let (store, outcome) = SettingsMigrator::new(dir.path()).prepare_store().unwrap();

        assert_eq!(outcome, MigrationOutcome::MigratedFrom(preferred));
        let settings = store.load();
        assert!(settings.debug_mode);
        assert!(!settings.auto_paste);
    }

    #[test]
    fn test_marker_blocks_legacy_resurrection() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("text-shot").join("settings.json"),
            r#"{"autoPaste":true}"#,
        );
        let migrator = SettingsMigrator::new(dir.path());
        migrator.prepare_store().unwrap();
        fs::remove_file(paths::settings_file(dir.path())).unwrap();

        let (store, outcome) = migrator.prepare_store().unwrap();

        assert_eq!(outcome, MigrationOutcome::CreatedDefaults);
        assert!(!store.load().auto_paste);
    }

    #[test]
    fn test_second_run_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let migrator = SettingsMigrator::new(dir.path());
        let (store, _) = migrator.prepare_store().unwrap();
        store.update(|s| s.launch_at_login = true).unwrap();
        let before = fs::read_to_string(store.path()).unwrap();

        let (_, outcome) = migrator.prepare_store().unwrap();

        assert_eq!(outcome, MigrationOutcome::AlreadyCurrent);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }
}
