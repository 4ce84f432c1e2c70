//! Start-at-login registration for the agent.

use auto_launch::{AutoLaunch, AutoLaunchBuilder};
use tracing::{debug, info};

const APP_NAME: &str = "Text Shot";

pub trait LaunchAtLogin: Send + Sync {
    fn apply(&self, enabled: bool) -> Result<(), String>;
}

pub struct AutoLaunchService {
    inner: AutoLaunch,
}

impl AutoLaunchService {
    /// Registers the currently running executable.
    pub fn for_current_exe() -> Result<Self, String> {
        let exe = std::env::current_exe()
            .map_err(|e| format!("Failed to resolve executable path: {e}"))?;
        let exe = exe
            .to_str()
            .ok_or_else(|| "Executable path is not valid UTF-8".to_string())?;

        let inner = AutoLaunchBuilder::new()
            .set_app_name(APP_NAME)
            .set_app_path(exe)
            .set_use_launch_agent(true)
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self { inner })
    }
}

impl LaunchAtLogin for AutoLaunchService {
    fn apply(&self, enabled: bool) -> Result<(), String> {
        let current = self.inner.is_enabled().map_err(|e| e.to_string())?;
        if current == enabled {
            debug!(enabled, "Launch at login already in the requested state");
            return Ok(());
        }

        if enabled {
            self.inner.enable().map_err(|e| e.to_string())?;
        } else {
            self.inner.disable().map_err(|e| e.to_string())?;
        }
        info!(enabled, "Launch at login updated");
        Ok(())
    }
}

/// Used when the platform registration could not be set up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLaunchAtLogin;

impl LaunchAtLogin for NoopLaunchAtLogin {
    fn apply(&self, enabled: bool) -> Result<(), String> {
        debug!(enabled, "Launch at login unavailable, ignoring");
        Ok(())
    }
}
