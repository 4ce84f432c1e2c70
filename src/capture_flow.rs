//! One capture transaction: permission check, region capture, OCR, clipboard.
//!
//! Only one capture runs at a time; a trigger that arrives while one is in flight is dropped.
//! Every path ends back in [`FlowState::Idle`] and every captured file is removed afterwards
//! unless `debugMode` is on.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::actions::TriggerSource;
use crate::config::{Settings, SettingsStore};
use crate::feedback::{Notifier, Toast};
use crate::permissions::{Clock, PermissionGate, PromptKind};
use crate::system::{
    AutoPaster, CaptureFailure, CaptureResult, CaptureService, ClipboardWriter, OcrEngine,
    OcrOutcome, RecognitionLevel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    CheckingPermission,
    Capturing,
    Recognizing,
    Finalizing,
}

/// Which branch a run took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Another capture was already in flight.
    Dropped,
    PermissionDenied,
    Canceled,
    CaptureFailed(CaptureFailure),
    NoText,
    /// Same text as the previous copy; clipboard rewritten silently.
    Duplicate,
    Copied {
        level: RecognitionLevel,
        pasted: bool,
    },
    /// Recognition or clipboard write failed.
    Failed(String),
}

/// Services a capture needs. Each is shared with the rest of the agent.
pub struct CaptureFlowDeps {
    pub store: SettingsStore,
    pub permissions: Arc<PermissionGate>,
    pub capture: Arc<dyn CaptureService>,
    pub ocr: OcrEngine,
    pub clipboard: Arc<dyn ClipboardWriter>,
    pub paster: Arc<dyn AutoPaster>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

pub struct CaptureFlow {
    deps: CaptureFlowDeps,
    in_flight: AtomicBool,
    state: Mutex<FlowState>,
    last_copied: Mutex<String>,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl CaptureFlow {
    pub fn new(deps: CaptureFlowDeps) -> Self {
        Self {
            deps,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(FlowState::Idle),
            last_copied: Mutex::new(String::new()),
        }
    }

    pub fn state(&self) -> FlowState {
        self.state.lock().map(|s| *s).unwrap_or(FlowState::Idle)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn transition(&self, next: FlowState) {
        if let Ok(mut state) = self.state.lock() {
            debug!(from = ?*state, to = ?next, "Capture flow transition");
            *state = next;
        }
    }

    pub async fn run(&self, source: TriggerSource) -> FlowOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(source = source.as_str(), "Capture already in flight, dropping trigger");
            return FlowOutcome::Dropped;
        }
        let _guard = InFlightGuard(&self.in_flight);

        info!(source = source.as_str(), "Capture started");
        let outcome = self.run_exclusive().await;
        self.transition(FlowState::Idle);
        info!(source = source.as_str(), outcome = ?outcome, "Capture finished");
        outcome
    }

    async fn run_exclusive(&self) -> FlowOutcome {
        let settings = self.deps.store.load();

        self.transition(FlowState::CheckingPermission);
        let permissions = &self.deps.permissions;
        if !permissions.preflight_authorized() && !permissions.request_if_needed_once_per_launch()
        {
            warn!("Screen Recording not authorized");
            self.prompt_if_allowed(PromptKind::ScreenRecording);
            return FlowOutcome::PermissionDenied;
        }

        self.transition(FlowState::Capturing);
        let path = match self.deps.capture.capture_region().await {
            CaptureResult::Captured(path) => path,
            CaptureResult::Canceled => return FlowOutcome::Canceled,
            CaptureResult::Failed(failure) => {
                if failure == CaptureFailure::PermissionDenied {
                    self.prompt_if_allowed(PromptKind::ScreenRecording);
                } else {
                    self.toast(&settings, Toast::CaptureFailed);
                }
                return FlowOutcome::CaptureFailed(failure);
            }
        };

        self.transition(FlowState::Recognizing);
        let outcome = self.recognize_and_deliver(&path, &settings).await;

        self.transition(FlowState::Finalizing);
        self.finalize(&path);
        outcome
    }

    async fn recognize_and_deliver(&self, path: &Path, settings: &Settings) -> FlowOutcome {
        let (text, level) = match self.deps.ocr.run_with_retry(path).await {
            Ok(OcrOutcome::Text { text, level }) => (text, level),
            Ok(OcrOutcome::NoText) => {
                self.toast(settings, Toast::NoText);
                return FlowOutcome::NoText;
            }
            Err(e) => {
                error!(error = %e, "Text recognition failed");
                self.toast(settings, Toast::Error);
                return FlowOutcome::Failed(e.to_string());
            }
        };

        let is_duplicate = self
            .last_copied
            .lock()
            .map(|last| *last == text)
            .unwrap_or(false);
        if is_duplicate {
            debug!(len = text.len(), "Same text as last copy, refreshing clipboard only");
            if let Err(e) = self.deps.clipboard.write_text(&text) {
                warn!(error = %e, "Failed to refresh clipboard");
            }
            return FlowOutcome::Duplicate;
        }

        if let Err(e) = self.deps.clipboard.write_text(&text) {
            error!(error = %e, "Failed to copy recognized text");
            self.toast(settings, Toast::Error);
            return FlowOutcome::Failed(e.to_string());
        }
        if let Ok(mut last) = self.last_copied.lock() {
            *last = text.clone();
        }
        info!(len = text.len(), level = %level, "Copied recognized text");

        let mut pasted = false;
        if settings.auto_paste {
            match self.deps.paster.paste().await {
                Ok(()) => pasted = true,
                Err(e) => {
                    warn!(error = %e, "Auto-paste failed");
                    self.prompt_if_allowed(PromptKind::Accessibility);
                }
            }
        }

        self.toast(settings, Toast::Copied);
        FlowOutcome::Copied { level, pasted }
    }

    fn finalize(&self, path: &Path) {
        // Re-read: debug mode may have been toggled while the capture was running.
        if self.deps.store.load().debug_mode {
            info!(path = %path.display(), "Debug mode: keeping capture file");
            return;
        }
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed capture file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, path = %path.display(), "Failed to remove capture file"),
        }
    }

    fn toast(&self, settings: &Settings, toast: Toast) {
        if settings.show_confirmation {
            self.deps.notifier.toast(toast);
        }
    }

    fn prompt_if_allowed(&self, kind: PromptKind) {
        let now = self.deps.clock.now_ms();
        match self
            .deps
            .permissions
            .claim_prompt(&self.deps.store, kind, now)
        {
            Ok(true) => self.deps.notifier.permission_prompt(kind),
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, kind = kind.as_str(), "Failed to persist prompt time");
                self.deps.notifier.permission_prompt(kind);
            }
        }
    }
}
