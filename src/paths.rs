//! Filesystem locations for settings, capture scratch files, and companion executables.

use std::env;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "Text Shot";
const LEGACY_APP_DIR_NAME: &str = "text-shot";
const SETTINGS_FILE_NAME: &str = "settings-v2.json";
const LEGACY_SETTINGS_FILE_NAME: &str = "settings.json";
const MIGRATION_MARKER_NAME: &str = ".migration-v2-done";
const CAPTURE_DIR_NAME: &str = "text-shot-capture";

/// Base directory holding every per-user application directory (`~/Library/Application Support`
/// on macOS, `~/.config` on Linux).
pub fn get_config_base_dir() -> Result<PathBuf, String> {
    dirs::config_dir().ok_or_else(|| "No config directory available on this platform".to_string())
}

/// `<base>/Text Shot`
pub fn app_dir(base: &Path) -> PathBuf {
    base.join(APP_DIR_NAME)
}

/// `<base>/Text Shot/settings-v2.json`
pub fn settings_file(base: &Path) -> PathBuf {
    app_dir(base).join(SETTINGS_FILE_NAME)
}

/// `<base>/Text Shot/.migration-v2-done`
pub fn migration_marker(base: &Path) -> PathBuf {
    app_dir(base).join(MIGRATION_MARKER_NAME)
}

/// Pre-v2 settings files, most preferred first.
pub fn legacy_settings_candidates(base: &Path) -> Vec<PathBuf> {
    vec![
        base.join(APP_DIR_NAME).join(LEGACY_SETTINGS_FILE_NAME),
        base.join(LEGACY_APP_DIR_NAME).join(LEGACY_SETTINGS_FILE_NAME),
    ]
}

/// Scratch directory for region captures.
pub fn capture_temp_dir() -> PathBuf {
    env::temp_dir().join(CAPTURE_DIR_NAME)
}

/// Locates a helper executable shipped next to the agent.
///
/// Order: the `env_override` variable, the executable's directory, `bin/` beside the
/// executable's parent (app bundle `Resources` layout), then `bin/` under the working directory.
pub fn find_companion_binary(name: &str, env_override: &str) -> Option<PathBuf> {
    if let Some(path) = env::var_os(env_override).map(PathBuf::from) {
        if path.is_file() {
            return Some(path);
        }
        tracing::warn!(var = env_override, path = %path.display(), "Override does not point to a file");
    }

    let mut candidates = Vec::new();
    if let Some(exe_dir) = env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        candidates.push(exe_dir.join(name));
        if let Some(contents) = exe_dir.parent() {
            candidates.push(contents.join("Resources").join("bin").join(name));
        }
    }
    if let Ok(cwd) = env::current_dir() {
        candidates.push(cwd.join("bin").join(name));
    }

    candidates.into_iter().find(|candidate| candidate.is_file())
}
