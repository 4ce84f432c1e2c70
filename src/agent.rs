//! The background agent: one event loop on the main thread driving every component.
//!
//! Hotkey presses, action-socket requests, debounced settings changes and editor exits all
//! arrive on one channel. Captures run as spawned tasks so the loop keeps consuming events while
//! a region is being selected.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::action_socket::start_action_socket_listener;
use crate::actions::{parse_app_action, AppAction, AppEvent, TriggerSource};
use crate::capture_flow::{CaptureFlow, CaptureFlowDeps, FlowOutcome};
use crate::config::{Settings, SettingsStore};
use crate::feedback::LogNotifier;
use crate::hotkeys::{
    forward_hotkey_events, DisabledRegistrar, GlobalHotkeyRegistrar, HotkeyBindingManager,
    HotkeyRegistrar,
};
use crate::launch::{AutoLaunchService, LaunchAtLogin, NoopLaunchAtLogin};
use crate::paths;
use crate::permissions::{PermissionGate, SystemClock, SystemScreenCaptureAuthorization};
use crate::settings_sync::{apply_persisted_settings, EditorOpen, SettingsEditorSupervisor};
use crate::system::{
    CaptureTempStore, CaptureToolCommand, HelperRecognizer, KeystrokePaster, OcrEngine,
    ScreenCaptureTool, SystemClipboard, STALE_CAPTURE_AGE,
};

pub const START_ACTION_ENV: &str = "TEXT_SHOT_START_ACTION";

const SETTINGS_CHANNEL_CAPACITY: usize = 16;

/// What the loop did with one event.
#[derive(Debug)]
pub enum Dispatch {
    Handled,
    /// Press of a shortcut that is no longer the active binding.
    Ignored,
    CaptureStarted(JoinHandle<FlowOutcome>),
    Quit,
}

pub struct Agent<R: HotkeyRegistrar> {
    store: SettingsStore,
    flow: Arc<CaptureFlow>,
    hotkeys: HotkeyBindingManager<R>,
    launch: Box<dyn LaunchAtLogin>,
    editor: SettingsEditorSupervisor,
    changes: broadcast::Sender<Settings>,
    inbox: UnboundedReceiver<AppEvent>,
}

impl<R: HotkeyRegistrar> Agent<R> {
    pub fn new(
        store: SettingsStore,
        flow: Arc<CaptureFlow>,
        hotkeys: HotkeyBindingManager<R>,
        launch: Box<dyn LaunchAtLogin>,
        editor: SettingsEditorSupervisor,
        inbox: UnboundedReceiver<AppEvent>,
    ) -> Self {
        let (changes, _) = broadcast::channel(SETTINGS_CHANNEL_CAPACITY);
        Self {
            store,
            flow,
            hotkeys,
            launch,
            editor,
            changes,
            inbox,
        }
    }

    /// Receives the settings after every reconcile.
    pub fn subscribe(&self) -> broadcast::Receiver<Settings> {
        self.changes.subscribe()
    }

    pub fn hotkeys(&self) -> &HotkeyBindingManager<R> {
        &self.hotkeys
    }

    /// Reloads settings and applies them. Failures are logged; the agent keeps its current state.
    pub fn reconcile(&mut self, repair_hotkey: bool) {
        match apply_persisted_settings(
            &self.store,
            &mut self.hotkeys,
            self.launch.as_ref(),
            &self.changes,
            repair_hotkey,
        ) {
            Ok(report) => debug!(
                hotkey = ?report.hotkey.active.as_ref().map(|s| s.accelerator()),
                repaired = report.repaired,
                "Settings applied"
            ),
            Err(e) => error!(error = %e, "Failed to apply persisted settings"),
        }
    }

    fn spawn_capture(&self, source: TriggerSource) -> JoinHandle<FlowOutcome> {
        let flow = Arc::clone(&self.flow);
        tokio::spawn(async move { flow.run(source).await })
    }

    pub fn handle_event(&mut self, event: AppEvent) -> Dispatch {
        match event {
            AppEvent::HotkeyPressed(id) => {
                if !self.hotkeys.is_active_id(id) {
                    debug!(id, "Ignoring press of an inactive shortcut");
                    return Dispatch::Ignored;
                }
                Dispatch::CaptureStarted(self.spawn_capture(TriggerSource::Hotkey))
            }
            AppEvent::Action(AppAction::Capture, source) => {
                Dispatch::CaptureStarted(self.spawn_capture(source))
            }
            AppEvent::Action(AppAction::OpenSettings, _) => {
                match self.editor.open() {
                    Ok(EditorOpen::Refocused) => debug!("Settings editor already open"),
                    Ok(EditorOpen::Spawned { pid }) => debug!(pid, "Settings editor opened"),
                    Err(e) => warn!(error = %e, "Failed to open settings"),
                }
                Dispatch::Handled
            }
            AppEvent::Action(AppAction::Quit, source) => {
                info!(source = source.as_str(), "Quit requested");
                Dispatch::Quit
            }
            AppEvent::SettingsFileChanged => {
                self.reconcile(true);
                Dispatch::Handled
            }
            AppEvent::EditorExited { pid } => {
                if self.editor.editor_exited(pid) {
                    self.reconcile(true);
                }
                Dispatch::Handled
            }
        }
    }

    /// Applies the persisted settings, then consumes events until quit, Ctrl+C, or every sender
    /// is gone.
    pub async fn run(mut self) {
        self.reconcile(false);

        // One listener for the whole loop so a Ctrl+C between iterations is not lost.
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        #[cfg(target_os = "macos")]
        let mut run_loop_tick = tokio::time::interval(std::time::Duration::from_millis(50));

        loop {
            #[cfg(target_os = "macos")]
            let event = tokio::select! {
                event = self.inbox.recv() => event,
                _ = &mut shutdown => None,
                _ = run_loop_tick.tick() => {
                    macos_run_loop::pump();
                    continue;
                }
            };
            #[cfg(not(target_os = "macos"))]
            let event = tokio::select! {
                event = self.inbox.recv() => event,
                _ = &mut shutdown => None,
            };

            let Some(event) = event else {
                info!("Shutting down");
                break;
            };
            if matches!(self.handle_event(event), Dispatch::Quit) {
                break;
            }
        }

        self.editor.clear();
        self.hotkeys.unbind();
    }
}

/// Hotkey press events on macOS are dispatched from the main thread's CFRunLoop, which the tokio
/// runtime never runs on its own.
#[cfg(target_os = "macos")]
mod macos_run_loop {
    use std::ffi::c_void;

    #[link(name = "CoreFoundation", kind = "framework")]
    extern "C" {
        static kCFRunLoopDefaultMode: *const c_void;
        fn CFRunLoopRunInMode(mode: *const c_void, seconds: f64, return_after_source: u8) -> i32;
    }

    pub fn pump() {
        // SAFETY: called on the main thread; the mode constant is a static CFString.
        unsafe {
            CFRunLoopRunInMode(kCFRunLoopDefaultMode, 0.0, 1);
        }
    }
}

/// Forwards an action carried over from `text-shot action <name>` when no agent was running.
fn queue_start_action(events: &UnboundedSender<AppEvent>) {
    let Ok(raw) = std::env::var(START_ACTION_ENV) else {
        return;
    };
    std::env::remove_var(START_ACTION_ENV);
    match parse_app_action(&raw) {
        Some(action) => {
            info!(action = action.as_str(), "Running start action");
            let _ = events.send(AppEvent::Action(action, TriggerSource::Startup));
        }
        None => warn!(action = %raw, "Unknown start action"),
    }
}

fn system_registrar(events: &UnboundedSender<AppEvent>) -> Box<dyn HotkeyRegistrar> {
    match GlobalHotkeyRegistrar::new() {
        Ok(registrar) => {
            forward_hotkey_events(events.clone());
            Box::new(registrar)
        }
        Err(e) => {
            warn!(error = %e, "Global shortcuts unavailable; use `text-shot action capture`");
            Box::new(DisabledRegistrar::new(e.to_string()))
        }
    }
}

fn system_launch_at_login() -> Box<dyn LaunchAtLogin> {
    match AutoLaunchService::for_current_exe() {
        Ok(service) => Box::new(service),
        Err(e) => {
            warn!(error = %e, "Launch at login unavailable");
            Box::new(NoopLaunchAtLogin)
        }
    }
}

fn system_capture_flow(store: &SettingsStore) -> CaptureFlow {
    let temp = CaptureTempStore::new(paths::capture_temp_dir());
    let purged = temp.purge_stale(STALE_CAPTURE_AGE);
    if purged > 0 {
        info!(purged, "Removed stale capture files");
    }

    CaptureFlow::new(CaptureFlowDeps {
        store: store.clone(),
        permissions: Arc::new(PermissionGate::new(Arc::new(SystemScreenCaptureAuthorization))),
        capture: Arc::new(ScreenCaptureTool::new(
            CaptureToolCommand::platform_default(),
            temp,
        )),
        ocr: OcrEngine::new(Arc::new(HelperRecognizer::discover())),
        clipboard: Arc::new(SystemClipboard::new()),
        paster: Arc::new(KeystrokePaster),
        notifier: Arc::new(LogNotifier),
        clock: Arc::new(SystemClock),
    })
}

/// Wires the platform services around `store` and runs the agent until it quits.
pub async fn run_agent(store: SettingsStore) {
    let (events, inbox) = mpsc::unbounded_channel();

    let registrar = system_registrar(&events);
    let flow = Arc::new(system_capture_flow(&store));
    let editor = SettingsEditorSupervisor::discover(store.path().to_path_buf(), events.clone());
    let socket = start_action_socket_listener(events.clone());
    queue_start_action(&events);
    drop(events);

    let agent = Agent::new(
        store,
        flow,
        HotkeyBindingManager::new(registrar),
        system_launch_at_login(),
        editor,
        inbox,
    );
    agent.run().await;

    if let Some(path) = socket {
        if let Err(e) = std::fs::remove_file(&path) {
            debug!(error = %e, path = %path.display(), "Action socket already removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkeys::tests::FakeRegistrar;
    use crate::hotkeys::ShortcutDescriptor;
    use crate::permissions::tests::FakeAuthorization;
    use crate::system::CaptureFailure;

    struct Harness {
        agent: Agent<FakeRegistrar>,
        registrar: FakeRegistrar,
        store: SettingsStore,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        harness_with_editor(None)
    }

    /// `editor_script`, when given, is installed as the settings editor executable.
    fn harness_with_editor(editor_script: Option<&str>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let editor_binary = editor_script.map(|script| {
            let path = dir.path().join("text-shot-settings");
            std::fs::write(&path, script).unwrap();
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            }
            path
        });
        let store = SettingsStore::new(dir.path().join("settings-v2.json"));
        let flow = CaptureFlow::new(CaptureFlowDeps {
            store: store.clone(),
            permissions: Arc::new(PermissionGate::new(Arc::new(FakeAuthorization::new(
                true, false,
            )))),
            capture: Arc::new(ScreenCaptureTool::new(
                None,
                CaptureTempStore::new(dir.path().join("captures")),
            )),
            ocr: OcrEngine::new(Arc::new(HelperRecognizer::with_path(
                dir.path().join("missing-helper"),
            ))),
            clipboard: Arc::new(SystemClipboard::new()),
            paster: Arc::new(KeystrokePaster),
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
        });
        let (events, inbox) = mpsc::unbounded_channel();
        let editor =
            SettingsEditorSupervisor::new(editor_binary, store.path().to_path_buf(), events);
        let registrar = FakeRegistrar::default();
        let agent = Agent::new(
            store.clone(),
            Arc::new(flow),
            HotkeyBindingManager::new(registrar.clone()),
            Box::new(NoopLaunchAtLogin),
            editor,
            inbox,
        );
        Harness {
            agent,
            registrar,
            store,
            _dir: dir,
        }
    }

    fn unavailable_tool(outcome: FlowOutcome) -> bool {
        matches!(
            outcome,
            FlowOutcome::CaptureFailed(CaptureFailure::Unexpected(_))
        )
    }

    #[tokio::test]
    async fn test_active_hotkey_starts_capture() {
        let mut h = harness();
        h.agent.reconcile(false);

        match h.agent.handle_event(AppEvent::HotkeyPressed(1)) {
            Dispatch::CaptureStarted(task) => assert!(unavailable_tool(task.await.unwrap())),
            other => panic!("expected a capture, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stale_hotkey_id_is_ignored() {
        let mut h = harness();
        h.agent.reconcile(false);

        assert!(matches!(
            h.agent.handle_event(AppEvent::HotkeyPressed(99)),
            Dispatch::Ignored
        ));
    }

    #[tokio::test]
    async fn test_socket_capture_and_quit() {
        let mut h = harness();

        let dispatch = h
            .agent
            .handle_event(AppEvent::Action(AppAction::Capture, TriggerSource::Socket));
        let Dispatch::CaptureStarted(task) = dispatch else {
            panic!("expected a capture");
        };
        assert!(unavailable_tool(task.await.unwrap()));

        assert!(matches!(
            h.agent
                .handle_event(AppEvent::Action(AppAction::Quit, TriggerSource::Socket)),
            Dispatch::Quit
        ));
    }

    #[tokio::test]
    async fn test_settings_change_rebinds_hotkey() {
        let mut h = harness();
        let mut changes = h.agent.subscribe();
        h.agent.reconcile(false);
        assert_eq!(h.registrar.registered(), vec!["CommandOrControl+Shift+2"]);

        h.store
            .update(|s| s.hotkey = ShortcutDescriptor::parse("Alt+K").unwrap())
            .unwrap();
        h.agent.handle_event(AppEvent::SettingsFileChanged);

        assert_eq!(h.registrar.registered(), vec!["Alt+K"]);
        let _initial = changes.recv().await.unwrap();
        let latest = changes.recv().await.unwrap();
        assert_eq!(latest.hotkey.accelerator(), "Alt+K");
    }

    fn take_shortcut_and_persist(h: &Harness, accelerator: &str) {
        h.registrar
            .taken
            .lock()
            .unwrap()
            .insert(accelerator.to_string());
        h.store
            .update(|s| s.hotkey = ShortcutDescriptor::parse(accelerator).unwrap())
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_editor_exit_repairs_unbindable_hotkey() {
        let mut h = harness_with_editor(Some("#!/bin/sh\nexit 0\n"));
        h.agent.reconcile(false);
        take_shortcut_and_persist(&h, "Alt+B");

        h.agent.handle_event(AppEvent::Action(
            AppAction::OpenSettings,
            TriggerSource::Socket,
        ));
        let exited = loop {
            let event = tokio::time::timeout(std::time::Duration::from_secs(5), h.agent.inbox.recv())
                .await
                .unwrap()
                .unwrap();
            if matches!(event, AppEvent::EditorExited { .. }) {
                break event;
            }
        };
        h.agent.handle_event(exited);

        assert_eq!(
            h.agent.hotkeys().active(),
            Some(&ShortcutDescriptor::default())
        );
        assert_eq!(h.store.load().hotkey, ShortcutDescriptor::default());
    }

    #[tokio::test]
    async fn test_exit_of_untracked_editor_is_ignored() {
        let mut h = harness();
        h.agent.reconcile(false);
        take_shortcut_and_persist(&h, "Alt+B");

        h.agent.handle_event(AppEvent::EditorExited { pid: 4242 });

        assert_eq!(h.store.load().hotkey.accelerator(), "Alt+B");
    }

    #[tokio::test]
    async fn test_open_settings_without_editor_keeps_running() {
        let mut h = harness();
        assert!(matches!(
            h.agent.handle_event(AppEvent::Action(
                AppAction::OpenSettings,
                TriggerSource::Socket
            )),
            Dispatch::Handled
        ));
    }

    #[tokio::test]
    async fn test_run_stops_on_quit_and_releases_hotkey() {
        let h = harness();
        let registrar = h.registrar.clone();
        let (events, inbox) = mpsc::unbounded_channel();
        let mut agent = h.agent;
        agent.inbox = inbox;

        events
            .send(AppEvent::Action(AppAction::Quit, TriggerSource::Startup))
            .unwrap();
        agent.run().await;

        assert!(registrar.registered().is_empty());
    }

    #[test]
    fn test_start_action_is_consumed() {
        let (events, mut inbox) = mpsc::unbounded_channel();
        std::env::set_var(START_ACTION_ENV, "settings");

        queue_start_action(&events);

        assert_eq!(
            inbox.try_recv(),
            Ok(AppEvent::Action(
                AppAction::OpenSettings,
                TriggerSource::Startup
            ))
        );
        assert!(std::env::var(START_ACTION_ENV).is_err());
    }
}
