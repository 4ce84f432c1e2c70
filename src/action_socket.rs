//! Unix domain socket used for single-instance action dispatch.
//!
//! When a second process is started (e.g. `text-shot action capture`), it tries to connect to a
//! running agent via this socket and send an action word instead of starting a new agent. The
//! path is `$XDG_RUNTIME_DIR/text-shot.sock` when that directory exists, else
//! `/tmp/text-shot-{uid}.sock`. On non-Unix platforms the socket is not used; `main.rs` still
//! calls `send_action_to_running_instance` and falls back to setting `TEXT_SHOT_START_ACTION`
//! for the agent it is about to start.
//!
//! The listener runs in a background thread; each incoming connection carries a single action
//! word which is parsed and forwarded to the agent loop.

#[cfg(unix)]
use std::io::{Read, Write};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;
#[cfg(unix)]
use tracing::{debug, warn};

use crate::actions::AppEvent;
#[cfg(unix)]
use crate::actions::{parse_app_action, TriggerSource};

const SOCKET_NAME: &str = "text-shot.sock";

// --- Path selection (Unix) ---

#[cfg(unix)]
fn current_uid() -> u32 {
    // SAFETY: getuid(2) cannot fail and touches no memory.
    unsafe { libc::getuid() }
}

/// Returns the path where the action socket is bound.
#[cfg(unix)]
pub fn action_socket_path() -> PathBuf {
    if let Some(runtime_dir) = std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from) {
        if runtime_dir.is_dir() {
            return runtime_dir.join(SOCKET_NAME);
        }
    }
    PathBuf::from(format!("/tmp/text-shot-{}.sock", current_uid()))
}

#[cfg(not(unix))]
pub fn action_socket_path() -> PathBuf {
    PathBuf::from(SOCKET_NAME)
}

// --- Sending action to running instance (used by main.rs) ---

#[cfg(unix)]
fn send_action_to(path: &std::path::Path, action: &str) -> Result<(), String> {
    let mut stream = UnixStream::connect(path)
        .map_err(|e| format!("could not connect to a running instance: {e}"))?;
    stream
        .write_all(action.trim().as_bytes())
        .map_err(|e| format!("failed to send action to running instance: {e}"))
}

#[cfg(unix)]
pub fn send_action_to_running_instance(action: &str) -> Result<(), String> {
    let mut candidates = vec![action_socket_path()];
    let tmp = PathBuf::from(format!("/tmp/text-shot-{}.sock", current_uid()));
    if !candidates.contains(&tmp) {
        candidates.push(tmp);
    }

    for path in candidates {
        if send_action_to(&path, action).is_ok() {
            return Ok(());
        }
    }
    Err("could not connect to a running instance action socket".to_string())
}

#[cfg(not(unix))]
pub fn send_action_to_running_instance(_action: &str) -> Result<(), String> {
    Err("action bridge is not supported on this platform".to_string())
}

// --- Listener (Unix only) ---

#[cfg(unix)]
fn bind_listener(path: &std::path::Path) -> Option<UnixListener> {
    match UnixListener::bind(path) {
        Ok(listener) => Some(listener),
        Err(bind_err) => {
            if !path.exists() {
                warn!(error = %bind_err, path = %path.display(), "Failed to bind action socket");
                return None;
            }
            if UnixStream::connect(path).is_ok() {
                warn!(path = %path.display(), "Action socket already in use by another instance");
                return None;
            }
            // Stale socket left by a crashed agent.
            let _ = std::fs::remove_file(path);
            match UnixListener::bind(path) {
                Ok(listener) => Some(listener),
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Failed to bind action socket after cleanup");
                    None
                }
            }
        }
    }
}

#[cfg(unix)]
fn serve(listener: UnixListener, events: UnboundedSender<AppEvent>) {
    for stream_result in listener.incoming() {
        let mut stream = match stream_result {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Action socket accept failed");
                continue;
            }
        };

        let mut payload = String::new();
        if let Err(e) = stream.read_to_string(&mut payload) {
            warn!(error = %e, "Action socket read failed");
            continue;
        }

        let action_raw = payload.trim();
        match parse_app_action(action_raw) {
            Some(action) => {
                debug!(action = action.as_str(), "Action received on socket");
                if events
                    .send(AppEvent::Action(action, TriggerSource::Socket))
                    .is_err()
                {
                    return;
                }
            }
            None => warn!(action = %action_raw, "Unknown action command"),
        }
    }
}

/// Binds `path` and forwards incoming actions from a background thread. Returns the bound path
/// so the caller can remove it on shutdown.
#[cfg(unix)]
pub fn start_action_socket_listener_at(
    path: PathBuf,
    events: UnboundedSender<AppEvent>,
) -> Option<PathBuf> {
    let listener = bind_listener(&path)?;
    std::thread::spawn(move || serve(listener, events));
    Some(path)
}

pub fn start_action_socket_listener(events: UnboundedSender<AppEvent>) -> Option<PathBuf> {
    #[cfg(unix)]
    {
        start_action_socket_listener_at(action_socket_path(), events)
    }
    #[cfg(not(unix))]
    {
        let _ = events;
        None
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::actions::AppAction;
    use std::time::Duration;

    #[tokio::test]
    async fn test_actions_are_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.sock");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let bound = start_action_socket_listener_at(path.clone(), tx).unwrap();
        assert_eq!(bound, path);

        send_action_to(&path, "bogus").unwrap();
        send_action_to(&path, " capture\n").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(
            event,
            Some(AppEvent::Action(AppAction::Capture, TriggerSource::Socket))
        );
    }

    #[test]
    fn test_stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        drop(UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        assert!(bind_listener(&path).is_some());
    }

    #[test]
    fn test_live_socket_is_not_stolen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.sock");
        let _live = UnixListener::bind(&path).unwrap();

        assert!(bind_listener(&path).is_none());
    }

    #[test]
    fn test_send_without_listener_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(send_action_to(&dir.path().join("none.sock"), "capture").is_err());
    }
}
