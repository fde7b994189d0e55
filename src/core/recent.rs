//! Global most-recently-opened file list, one path per line.

use std::fs;
use std::path::{Path, PathBuf};

pub const MAX_RECENT: usize = 10;

#[derive(Debug, Clone)]
pub struct RecentFiles {
    file: PathBuf,
    entries: Vec<PathBuf>,
}

impl RecentFiles {
    /// `~/.chix/recent_files.txt`, or the working directory without a home
    pub fn default_path() -> PathBuf {
        let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
        match home {
            Some(home) => PathBuf::from(home).join(".chix").join("recent_files.txt"),
            None => PathBuf::from("recent_files.txt"),
        }
    }

    /// Read the list, dropping entries whose files no longer exist.
    /// An unreadable list is treated as empty.
    pub fn load(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let entries = match fs::read_to_string(&file) {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(PathBuf::from)
                .filter(|path| path.exists())
                .take(MAX_RECENT)
                .collect(),
            Err(_) => Vec::new(),
        };
        Self { file, entries }
    }

    /// Most recent first
    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move `path` to the front and persist. Persist failures are logged only.
    pub fn add(&mut self, path: &Path) {
        self.entries.retain(|p| p != path);
        self.entries.insert(0, path.to_path_buf());
        self.entries.truncate(MAX_RECENT);
        if let Err(e) = self.save() {
            tracing::debug!("could not write {}: {}", self.file.display(), e);
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        if let Some(parent) = self.file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut text = String::new();
        for path in &self.entries {
            text.push_str(&path.to_string_lossy());
            text.push('\n');
        }
        fs::write(&self.file, text)
    }
}
