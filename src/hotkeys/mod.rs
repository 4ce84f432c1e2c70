//! Global capture shortcut: one binding at a time, switched without a gap.
//!
//! A new shortcut is registered before the old one is released, so a successful switch never
//! leaves the agent without a binding and a failed one keeps the previous binding active.
//! [`HotkeyBindingManager::apply_or_fallback`] falls back to the default shortcut only when
//! nothing is bound yet.

mod registrar;
pub mod shortcut;

pub use registrar::{forward_hotkey_events, DisabledRegistrar, GlobalHotkeyRegistrar};
pub use shortcut::{KeyToken, Modifier, ShortcutDescriptor, DEFAULT_ACCELERATOR};

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HotkeyError {
    #[error("Invalid shortcut: {0}")]
    InvalidShortcut(String),
    #[error("Unsupported hotkey key: {0}")]
    UnsupportedKey(String),
    #[error("Unsupported modifier token: {0}")]
    UnsupportedModifier(String),
    #[error("Failed to register {shortcut}: {reason}")]
    Registration { shortcut: String, reason: String },
}

/// OS-level shortcut registration.
pub trait HotkeyRegistrar {
    /// Registers the shortcut and returns the id its press events carry.
    fn register(&mut self, shortcut: &ShortcutDescriptor) -> Result<u32, HotkeyError>;
    fn unregister(&mut self, shortcut: &ShortcutDescriptor) -> Result<(), HotkeyError>;
}

impl<T: HotkeyRegistrar + ?Sized> HotkeyRegistrar for Box<T> {
    fn register(&mut self, shortcut: &ShortcutDescriptor) -> Result<u32, HotkeyError> {
        (**self).register(shortcut)
    }

    fn unregister(&mut self, shortcut: &ShortcutDescriptor) -> Result<(), HotkeyError> {
        (**self).unregister(shortcut)
    }
}

/// Answers whether a shortcut could be bound right now.
pub trait ShortcutAvailability {
    fn check_available(&mut self, shortcut: &ShortcutDescriptor) -> Result<(), HotkeyError>;
}

/// Checks availability by registering the shortcut and releasing it straight away.
pub struct TrialRegistration<R: HotkeyRegistrar> {
    registrar: R,
}

impl<R: HotkeyRegistrar> TrialRegistration<R> {
    pub fn new(registrar: R) -> Self {
        Self { registrar }
    }
}

impl<R: HotkeyRegistrar> ShortcutAvailability for TrialRegistration<R> {
    fn check_available(&mut self, shortcut: &ShortcutDescriptor) -> Result<(), HotkeyError> {
        self.registrar.register(shortcut)?;
        if let Err(e) = self.registrar.unregister(shortcut) {
            warn!(error = %e, shortcut = %shortcut, "Failed to release trial registration");
        }
        Ok(())
    }
}

/// Used when no shortcut service is reachable; every shortcut is accepted.
#[derive(Debug, Default, Clone, Copy)]
pub struct UncheckedAvailability;

impl ShortcutAvailability for UncheckedAvailability {
    fn check_available(&mut self, shortcut: &ShortcutDescriptor) -> Result<(), HotkeyError> {
        debug!(shortcut = %shortcut, "Shortcut availability not checked");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    Bound { shortcut: ShortcutDescriptor, id: u32 },
}

/// Outcome of [`HotkeyBindingManager::apply_or_fallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyApplyReport {
    pub requested: ShortcutDescriptor,
    pub active: Option<ShortcutDescriptor>,
    pub applied: bool,
    pub used_fallback: bool,
}

impl HotkeyApplyReport {
    /// True when the persisted shortcut should be rewritten to the one actually bound.
    pub fn needs_repair(&self) -> bool {
        match &self.active {
            Some(active) => *active != self.requested && (!self.applied || self.used_fallback),
            None => false,
        }
    }
}

pub struct HotkeyBindingManager<R: HotkeyRegistrar> {
    registrar: R,
    state: BindingState,
}

impl<R: HotkeyRegistrar> HotkeyBindingManager<R> {
    pub fn new(registrar: R) -> Self {
        Self {
            registrar,
            state: BindingState::Unbound,
        }
    }

    pub fn state(&self) -> &BindingState {
        &self.state
    }

    pub fn active(&self) -> Option<&ShortcutDescriptor> {
        match &self.state {
            BindingState::Bound { shortcut, .. } => Some(shortcut),
            BindingState::Unbound => None,
        }
    }

    /// Whether a press event with this id belongs to the active binding.
    pub fn is_active_id(&self, event_id: u32) -> bool {
        matches!(&self.state, BindingState::Bound { id, .. } if *id == event_id)
    }

    pub fn apply(&mut self, shortcut: &ShortcutDescriptor) -> Result<(), HotkeyError> {
        if self.active() == Some(shortcut) {
            debug!(shortcut = %shortcut, "Shortcut already active");
            return Ok(());
        }

        let id = self.registrar.register(shortcut)?;

        let previous = std::mem::replace(
            &mut self.state,
            BindingState::Bound {
                shortcut: shortcut.clone(),
                id,
            },
        );
        if let BindingState::Bound {
            shortcut: previous, ..
        } = previous
        {
            if let Err(e) = self.registrar.unregister(&previous) {
                warn!(error = %e, shortcut = %previous, "Failed to release previous shortcut");
            }
        }

        info!(shortcut = %shortcut, "Global shortcut registered");
        Ok(())
    }

    /// Parses then applies an accelerator string.
    pub fn apply_accelerator(&mut self, raw: &str) -> Result<(), HotkeyError> {
        let shortcut = ShortcutDescriptor::parse(raw)?;
        self.apply(&shortcut)
    }

    pub fn apply_or_fallback(&mut self, requested: &ShortcutDescriptor) -> HotkeyApplyReport {
        match self.apply(requested) {
            Ok(()) => {
                return HotkeyApplyReport {
                    requested: requested.clone(),
                    active: self.active().cloned(),
                    applied: true,
                    used_fallback: false,
                }
            }
            Err(e) => warn!(error = %e, shortcut = %requested, "Requested shortcut unavailable"),
        }

        if let Some(active) = self.active() {
            return HotkeyApplyReport {
                requested: requested.clone(),
                active: Some(active.clone()),
                applied: false,
                used_fallback: false,
            };
        }

        let fallback = ShortcutDescriptor::default();
        let fallback_applied = match self.apply(&fallback) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, shortcut = %fallback, "Default shortcut unavailable; no shortcut bound");
                false
            }
        };
        HotkeyApplyReport {
            requested: requested.clone(),
            active: self.active().cloned(),
            applied: fallback_applied,
            used_fallback: fallback_applied,
        }
    }

    /// Releases the active binding, if any.
    pub fn unbind(&mut self) {
        if let BindingState::Bound { shortcut, .. } =
            std::mem::replace(&mut self.state, BindingState::Unbound)
        {
            if let Err(e) = self.registrar.unregister(&shortcut) {
                warn!(error = %e, shortcut = %shortcut, "Failed to release shortcut");
            }
        }
    }
}
