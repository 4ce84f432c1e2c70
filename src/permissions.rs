//! Screen Recording authorization and throttling of the app's own permission prompts.
//!
//! The OS authorization request is issued at most once per process lifetime. Prompts explaining
//! where to grant access are throttled separately per [`PromptKind`], with the last-shown time
//! persisted in settings so the cooldown survives restarts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::config::{ConfigError, SettingsStore};

pub const PROMPT_THROTTLE_WINDOW_MS: i64 = 30_000;

/// Wall clock in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

/// The OS screen-capture authorization API.
pub trait ScreenCaptureAuthorization: Send + Sync {
    /// Non-blocking check; never shows UI.
    fn preflight(&self) -> bool;
    /// Asks the OS to prompt; returns whether access is granted now.
    fn request(&self) -> bool;
}

#[cfg(target_os = "macos")]
mod coregraphics {
    #[link(name = "CoreGraphics", kind = "framework")]
    extern "C" {
        fn CGPreflightScreenCaptureAccess() -> bool;
        fn CGRequestScreenCaptureAccess() -> bool;
    }

    pub fn preflight() -> bool {
        unsafe { CGPreflightScreenCaptureAccess() }
    }

    pub fn request() -> bool {
        unsafe { CGRequestScreenCaptureAccess() }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemScreenCaptureAuthorization;

impl ScreenCaptureAuthorization for SystemScreenCaptureAuthorization {
    #[cfg(target_os = "macos")]
    fn preflight(&self) -> bool {
        coregraphics::preflight()
    }

    #[cfg(target_os = "macos")]
    fn request(&self) -> bool {
        coregraphics::request()
    }

    // Other platforms have no capture permission model.
    #[cfg(not(target_os = "macos"))]
    fn preflight(&self) -> bool {
        true
    }

    #[cfg(not(target_os = "macos"))]
    fn request(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    ScreenRecording,
    Accessibility,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScreenRecording => "screen-recording",
            Self::Accessibility => "accessibility",
        }
    }
}

/// Suppressed while `now - last_shown_at < PROMPT_THROTTLE_WINDOW_MS`.
pub fn should_throttle(last_shown_at: i64, now_ms: i64) -> bool {
    now_ms.saturating_sub(last_shown_at) < PROMPT_THROTTLE_WINDOW_MS
}

pub struct PermissionGate {
    authorization: Arc<dyn ScreenCaptureAuthorization>,
    requested_this_launch: AtomicBool,
}

impl PermissionGate {
    pub fn new(authorization: Arc<dyn ScreenCaptureAuthorization>) -> Self {
        Self {
            authorization,
            requested_this_launch: AtomicBool::new(false),
        }
    }

    pub fn preflight_authorized(&self) -> bool {
        self.authorization.preflight()
    }

    /// True if already authorized. Otherwise the first call per launch asks the OS and returns
    /// its answer; later calls return false without asking again.
    pub fn request_if_needed_once_per_launch(&self) -> bool {
        if self.authorization.preflight() {
            return true;
        }
        if self.requested_this_launch.swap(true, Ordering::SeqCst) {
            debug!("Screen Recording already requested this launch");
            return false;
        }
        info!("Requesting Screen Recording access");
        self.authorization.request()
    }

    /// Checks the throttle for `kind` and, when the prompt may be shown, stamps `now_ms` in the
    /// settings file. Returns whether the caller should show the prompt.
    pub fn claim_prompt(
        &self,
        store: &SettingsStore,
        kind: PromptKind,
        now_ms: i64,
    ) -> Result<bool, ConfigError> {
        let current = store.load();
        let last = match kind {
            PromptKind::ScreenRecording => current.last_permission_prompt_at,
            PromptKind::Accessibility => current.last_accessibility_prompt_at,
        };
        if should_throttle(last, now_ms) {
            debug!(kind = kind.as_str(), last, now_ms, "Permission prompt throttled");
            return Ok(false);
        }

        store.update(|settings| match kind {
            PromptKind::ScreenRecording => settings.last_permission_prompt_at = now_ms,
            PromptKind::Accessibility => settings.last_accessibility_prompt_at = now_ms,
        })?;
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    pub(crate) struct FakeAuthorization {
        pub granted: AtomicBool,
        pub grant_on_request: bool,
        pub requests: AtomicUsize,
    }

    impl FakeAuthorization {
        pub(crate) fn new(granted: bool, grant_on_request: bool) -> Self {
            Self {
                granted: AtomicBool::new(granted),
                grant_on_request,
                requests: AtomicUsize::new(0),
            }
        }
    }

    impl ScreenCaptureAuthorization for FakeAuthorization {
        fn preflight(&self) -> bool {
            self.granted.load(Ordering::SeqCst)
        }

        fn request(&self) -> bool {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.grant_on_request {
                self.granted.store(true, Ordering::SeqCst);
            }
            self.grant_on_request
        }
    }

    #[test]
    fn test_throttle_boundary() {
        assert!(should_throttle(1_000, 1_000));
        assert!(should_throttle(1_000, 30_999));
        assert!(!should_throttle(1_000, 31_000));
        assert!(!should_throttle(0, 1_700_000_000_000));
    }

    #[test]
    fn test_request_skipped_when_authorized() {
        let auth = Arc::new(FakeAuthorization::new(true, false));
        let gate = PermissionGate::new(auth.clone());

        assert!(gate.request_if_needed_once_per_launch());
        assert_eq!(auth.requests.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_request_issued_once_per_launch() {
        let auth = Arc::new(FakeAuthorization::new(false, false));
        let gate = PermissionGate::new(auth.clone());

        assert!(!gate.request_if_needed_once_per_launch());
        assert!(!gate.request_if_needed_once_per_launch());
        assert!(!gate.request_if_needed_once_per_launch());
        assert_eq!(auth.requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_granted_request_returns_true() {
        let auth = Arc::new(FakeAuthorization::new(false, true));
        let gate = PermissionGate::new(auth);

        assert!(gate.request_if_needed_once_per_launch());
        assert!(gate.preflight_authorized());
    }

    #[test]
    fn test_claim_prompt_persists_and_throttles() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings-v2.json"));
        let gate = PermissionGate::new(Arc::new(FakeAuthorization::new(false, false)));
        let t0 = 1_700_000_000_000;

        assert!(gate.claim_prompt(&store, PromptKind::ScreenRecording, t0).unwrap());
        assert_eq!(store.load().last_permission_prompt_at, t0);

        // A fresh gate (new launch) still honors the persisted cooldown.
        let relaunched = PermissionGate::new(Arc::new(FakeAuthorization::new(false, false)));
        assert!(!relaunched
            .claim_prompt(&store, PromptKind::ScreenRecording, t0 + 29_999)
            .unwrap());
        assert!(relaunched
            .claim_prompt(&store, PromptKind::Accessibility, t0 + 1)
            .unwrap());
        assert!(relaunched
            .claim_prompt(&store, PromptKind::ScreenRecording, t0 + 30_000)
            .unwrap());
        assert_eq!(store.load().last_permission_prompt_at, t0 + 30_000);
        assert_eq!(store.load().last_accessibility_prompt_at, t0 + 1);
    }
}
