//! Crash-recovery snapshots of modified documents.
//!
//! Snapshots live in a shared temp directory, one file per document named
//! after the document's autosave key (`<uuid>.autosave`). They never touch the
//! user's own file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use uuid::Uuid;

use crate::core::error::FileError;
use crate::core::tabs::TabSet;

const SNAPSHOT_EXT: &str = "autosave";

/// The most recent snapshot written for a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutosaveHandle {
    pub key: Uuid,
    pub path: PathBuf,
    pub saved_at: SystemTime,
}

/// Directory of snapshots
#[derive(Debug, Clone)]
pub struct AutosaveStore {
    dir: PathBuf,
}

impl AutosaveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join("chix_autosave")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, key: Uuid) -> PathBuf {
        self.dir.join(format!("{}.{}", key, SNAPSHOT_EXT))
    }

    /// Atomically replace the snapshot for `key`
    pub fn snapshot(&self, key: Uuid, content: &str) -> Result<AutosaveHandle, FileError> {
        fs::create_dir_all(&self.dir).map_err(FileError::Autosave)?;
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir).map_err(FileError::Autosave)?;
        temp.write_all(content.as_bytes()).map_err(FileError::Autosave)?;
        temp.flush().map_err(FileError::Autosave)?;

        let path = self.snapshot_path(key);
        temp.persist(&path)
            .map_err(|e| FileError::Autosave(e.error))?;
        Ok(AutosaveHandle {
            key,
            path,
            saved_at: SystemTime::now(),
        })
    }

    pub fn load(&self, key: Uuid) -> Option<String> {
        fs::read_to_string(self.snapshot_path(key)).ok()
    }

    /// Delete the snapshot for `key`, if any
    pub fn remove(&self, key: Uuid) {
        let path = self.snapshot_path(key);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::debug!("could not remove snapshot {}: {}", path.display(), e);
            }
        }
    }

    /// Snapshots present on disk, oldest first
    pub fn recoverable(&self) -> Vec<AutosaveHandle> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut found: Vec<AutosaveHandle> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXT) {
                    return None;
                }
                let key = Uuid::parse_str(path.file_stem()?.to_str()?).ok()?;
                let saved_at = entry.metadata().ok()?.modified().ok()?;
                Some(AutosaveHandle {
                    key,
                    path,
                    saved_at,
                })
            })
            .collect();
        found.sort_by_key(|h| h.saved_at);
        found
    }

    /// Housekeeping at startup: drop snapshots older than `max_age`.
    /// Failures are logged only.
    pub fn clean_stale(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let mut removed = 0;
        for handle in self.recoverable() {
            let age = now.duration_since(handle.saved_at).unwrap_or_default();
            if age >= max_age {
                match fs::remove_file(&handle.path) {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::debug!("stale snapshot {} kept: {}", handle.path.display(), e),
                }
            }
        }
        if removed > 0 {
            tracing::info!("removed {} stale autosave snapshots", removed);
        }
        removed
    }
}

impl Default for AutosaveStore {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

/// Fixed-interval autosave driven by the UI loop
#[derive(Debug)]
pub struct Autosaver {
    interval: Duration,
    last_run: Instant,
}

impl Autosaver {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_run: now,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left until the next snapshot pass
    pub fn time_until_due(&self, now: Instant) -> Duration {
        (self.last_run + self.interval).saturating_duration_since(now)
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.duration_since(self.last_run) >= self.interval
    }

    /// Snapshot every modified tab if the interval elapsed. Returns how many
    /// snapshots were written.
    pub fn tick(&mut self, now: Instant, tabs: &mut TabSet) -> usize {
        if !self.is_due(now) {
            return 0;
        }
        self.last_run = now;
        tabs.autosave_all()
    }
}
