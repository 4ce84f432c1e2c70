//! Scratch files for captures.
//!
//! Every capture writes to its own uniquely named PNG under one directory so leftovers from a
//! crash can be found and purged on the next launch.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

/// Files older than this are removed by [`CaptureTempStore::purge_stale`].
pub const STALE_CAPTURE_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct CaptureTempStore {
    root: PathBuf,
}

impl CaptureTempStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns a path that no other capture has used: `capture-<epoch ms>-<nanoid>.png`.
    pub fn new_capture_path(&self) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let id = nanoid::nanoid!(12);
        Ok(self.root.join(format!("capture-{millis}-{id}.png")))
    }

    /// Deletes regular files older than `max_age`. Returns how many were removed.
    pub fn purge_stale(&self, max_age: Duration) -> usize {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return 0;
        };
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(UNIX_EPOCH);

        let mut removed = 0;
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().or_else(|_| meta.created()).unwrap_or(UNIX_EPOCH);
            if modified < cutoff {
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        warn!(error = %e, path = %entry.path().display(), "Failed to purge stale capture")
                    }
                }
            }
        }

        if removed > 0 {
            debug!(removed, dir = %self.root.display(), "Purged stale capture files");
        }
        removed
    }
}
