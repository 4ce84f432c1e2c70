//! Keeps the agent consistent with edits made by the settings editor process.
//!
//! The editor writes the settings file directly. While it is open the agent watches the settings
//! directory, coalesces bursts of file events into one [`AppEvent::SettingsFileChanged`], and
//! reconciles through [`apply_persisted_settings`]. When the editor exits the watcher is dropped
//! and one final reconcile runs.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::actions::AppEvent;
use crate::config::{ConfigError, Settings, SettingsStore};
use crate::hotkeys::{HotkeyApplyReport, HotkeyBindingManager, HotkeyRegistrar};
use crate::launch::LaunchAtLogin;
use crate::paths;

pub const SETTINGS_DEBOUNCE: Duration = Duration::from_millis(120);

const EDITOR_BINARY_NAME: &str = "text-shot-settings";
const EDITOR_BINARY_ENV: &str = "TEXT_SHOT_SETTINGS_BINARY";

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("text-shot-settings not found; set TEXT_SHOT_SETTINGS_BINARY to its path")]
    BinaryNotFound,
    #[error("Failed to start settings editor: {0}")]
    Spawn(#[source] io::Error),
    #[error("Settings editor exited before reporting a pid")]
    NoPid,
    #[error("Failed to watch settings file: {0}")]
    Watch(#[from] notify::Error),
}

// --- Refocus signal ---

/// Asks a running editor to bring itself forward (SIGUSR1).
#[cfg(unix)]
pub fn send_refocus_signal(pid: u32) -> io::Result<()> {
    // kill(0, ..) would signal the whole process group, the agent included.
    if pid == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "pid 0"));
    }
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, libc::SIGUSR1) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn send_refocus_signal(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "refocus signal is not supported on this platform",
    ))
}

// --- File watcher with debounce ---

fn is_settings_event(event: &Event, file_name: &std::ffi::OsStr) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event.paths.is_empty()
        || event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name))
}

/// Emits one [`AppEvent::SettingsFileChanged`] per burst of raw events; each raw event restarts
/// the quiet period.
pub(crate) async fn debounce_changes(
    mut raw: UnboundedReceiver<()>,
    window: Duration,
    out: UnboundedSender<AppEvent>,
) {
    while raw.recv().await.is_some() {
        let mut closed = false;
        loop {
            match tokio::time::timeout(window, raw.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }
        if out.send(AppEvent::SettingsFileChanged).is_err() || closed {
            return;
        }
    }
}

pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
    debounce: JoinHandle<()>,
}

impl SettingsWatcher {
    /// Watches the directory holding `settings_path` (non-recursive). Must be called from within
    /// a tokio runtime.
    pub fn start(
        settings_path: &Path,
        events: UnboundedSender<AppEvent>,
    ) -> Result<Self, EditorError> {
        let directory = settings_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = settings_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) if is_settings_event(&event, &file_name) => {
                    let _ = raw_tx.send(());
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Settings watcher error"),
            },
            Config::default(),
        )?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        let debounce = tokio::spawn(debounce_changes(raw_rx, SETTINGS_DEBOUNCE, events));
        debug!(dir = %directory.display(), "Watching settings directory");
        Ok(Self {
            _watcher: watcher,
            debounce,
        })
    }
}

impl Drop for SettingsWatcher {
    fn drop(&mut self) {
        self.debounce.abort();
    }
}

// --- Editor process ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorOpen {
    Refocused,
    Spawned { pid: u32 },
}

/// Owns the settings editor child process and the watcher that lives as long as it does.
pub struct SettingsEditorSupervisor {
    binary: Option<PathBuf>,
    settings_path: PathBuf,
    events: UnboundedSender<AppEvent>,
    running_pid: Option<u32>,
    watcher: Option<SettingsWatcher>,
}

impl SettingsEditorSupervisor {
    pub fn new(
        binary: Option<PathBuf>,
        settings_path: PathBuf,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            binary,
            settings_path,
            events,
            running_pid: None,
            watcher: None,
        }
    }

    /// Uses the editor found by [`paths::find_companion_binary`].
    pub fn discover(settings_path: PathBuf, events: UnboundedSender<AppEvent>) -> Self {
        let binary = paths::find_companion_binary(EDITOR_BINARY_NAME, EDITOR_BINARY_ENV);
        Self::new(binary, settings_path, events)
    }

    pub fn running_pid(&self) -> Option<u32> {
        self.running_pid
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    fn ensure_watcher(&mut self) {
        if self.watcher.is_some() {
            return;
        }
        match SettingsWatcher::start(&self.settings_path, self.events.clone()) {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(e) => warn!(error = %e, "Settings changes will only be picked up when the editor exits"),
        }
    }

    /// Refocuses the running editor, or starts one.
    pub fn open(&mut self) -> Result<EditorOpen, EditorError> {
        if let Some(pid) = self.running_pid {
            match send_refocus_signal(pid) {
                Ok(()) => {
                    debug!(pid, "Refocused settings editor");
                    self.ensure_watcher();
                    return Ok(EditorOpen::Refocused);
                }
                Err(e) => {
                    warn!(pid, error = %e, "Settings editor unreachable, starting a new one");
                    self.clear();
                }
            }
        }

        let binary = self.binary.as_ref().ok_or(EditorError::BinaryNotFound)?;
        // The agent never reads stdin, so a terminal session can drive the editor directly.
        let mut child = Command::new(binary)
            .arg("--settings-file")
            .arg(&self.settings_path)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(EditorError::Spawn)?;
        let Some(pid) = child.id() else {
            return Err(EditorError::NoPid);
        };

        let events = self.events.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(pid, code = ?status.code(), "Settings editor exited"),
                Err(e) => warn!(pid, error = %e, "Failed to wait for settings editor"),
            }
            let _ = events.send(AppEvent::EditorExited { pid });
        });

        info!(pid, "Settings editor started");
        self.running_pid = Some(pid);
        self.ensure_watcher();
        Ok(EditorOpen::Spawned { pid })
    }

    /// Handles the exit of editor `pid`. An exit reported for an editor that has already been
    /// replaced is ignored so the current one stays tracked and watched. Returns whether the
    /// tracked editor was the one that exited.
    pub fn editor_exited(&mut self, pid: u32) -> bool {
        if self.running_pid != Some(pid) {
            debug!(pid, running = ?self.running_pid, "Ignoring exit of a replaced settings editor");
            return false;
        }
        self.clear();
        true
    }

    /// Drops the process reference and stops watching.
    pub fn clear(&mut self) {
        self.running_pid = None;
        self.watcher = None;
    }
}

// --- Reconciliation ---

#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub settings: Settings,
    pub hotkey: HotkeyApplyReport,
    /// The persisted shortcut was rewritten to the one actually bound.
    pub repaired: bool,
}

/// Reloads settings from disk and applies them: shortcut, launch at login, in-process listeners.
pub fn apply_persisted_settings<R: HotkeyRegistrar>(
    store: &SettingsStore,
    hotkeys: &mut HotkeyBindingManager<R>,
    launch: &dyn LaunchAtLogin,
    changes: &broadcast::Sender<Settings>,
    repair_hotkey: bool,
) -> Result<ReconcileReport, ConfigError> {
    let mut settings = store.load();
    let report = hotkeys.apply_or_fallback(&settings.hotkey);

    let mut repaired = false;
    if repair_hotkey && report.needs_repair() {
        if let Some(active) = report.active.clone() {
            info!(requested = %report.requested, active = %active, "Persisting the shortcut actually bound");
            settings = store.update(|s| s.hotkey = active)?;
            repaired = true;
        }
    }

    if let Err(e) = launch.apply(settings.launch_at_login) {
        warn!(error = %e, "Failed to apply launch at login");
    }

    // No receivers is fine.
    let _ = changes.send(settings.clone());

    Ok(ReconcileReport {
        settings,
        hotkey: report,
        repaired,
    })
}
