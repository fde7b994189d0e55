//! Document: one open text buffer (a tab), optionally backed by a file.
//!
//! The document owns its text; views only read it. Text lives in a ropey
//! `Rope`, edits are addressed in chars.

use ropey::Rope;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

use crate::core::autosave::AutosaveHandle;
use crate::core::id::DocumentId;

/// How the on-disk bytes were decoded. Saving always writes UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Latin1,
}

#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    rope: Rope,
    /// Backing file, `None` for untitled buffers
    pub path: Option<PathBuf>,
    modified: bool,
    pub encoding: Encoding,
    /// Crash-recovery key, independent of `path`
    autosave_key: Uuid,
    autosave: Option<AutosaveHandle>,
    /// Modification time of the backing file when last loaded or saved
    pub disk_mtime: Option<SystemTime>,
    /// Bumped on every edit
    pub version: u64,
}

impl Document {
    /// Create an empty untitled document
    pub fn new(id: DocumentId) -> Self {
        Self::from_text(id, "")
    }

    /// Create an untitled document holding `text`. Starts unmodified.
    pub fn from_text(id: DocumentId, text: &str) -> Self {
        Self {
            id,
            rope: Rope::from_str(text),
            path: None,
            modified: false,
            encoding: Encoding::Utf8,
            autosave_key: Uuid::new_v4(),
            autosave: None,
            disk_mtime: None,
            version: 0,
        }
    }

    /// Open `path`. A missing file gives an empty buffer bound to that path; an
    /// unreadable one gives a buffer holding an error placeholder. Never fails.
    pub fn load(id: DocumentId, path: &Path) -> Self {
        let mut doc = Self::new(id);
        doc.path = Some(path.to_path_buf());

        if !path.exists() {
            return doc;
        }

        match fs::read(path) {
            Ok(bytes) => {
                let (text, encoding) = decode(bytes);
                if encoding == Encoding::Latin1 {
                    tracing::info!("{} is not UTF-8, decoded as latin-1", path.display());
                }
                doc.rope = Rope::from_str(&text);
                doc.encoding = encoding;
                doc.disk_mtime = fs::metadata(path).ok().and_then(|m| m.modified().ok());
            }
            Err(e) => {
                tracing::warn!("failed to load {}: {}", path.display(), e);
                doc.rope = Rope::from_str(&format!("// Error loading file: {}\n\n", e));
            }
        }
        doc
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    // ==================== Content Access ====================

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn rope(&self) -> &Rope {
        &self.rope
    }

    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Line without its trailing newline
    pub fn line(&self, line_idx: usize) -> Option<String> {
        if line_idx >= self.rope.len_lines() {
            return None;
        }
        let line = self.rope.line(line_idx).to_string();
        Some(line.trim_end_matches(['\n', '\r']).to_string())
    }

    // ==================== Editing ====================

    /// Insert at a char index (clamped to the end)
    pub fn insert(&mut self, char_idx: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        let at = char_idx.min(self.rope.len_chars());
        self.rope.insert(at, text);
        self.mark_modified();
    }

    /// Delete `len` chars starting at `char_idx` (clamped)
    pub fn delete(&mut self, char_idx: usize, len: usize) {
        let start = char_idx.min(self.rope.len_chars());
        let end = start.saturating_add(len).min(self.rope.len_chars());
        if start == end {
            return;
        }
        self.rope.remove(start..end);
        self.mark_modified();
    }

    pub fn append(&mut self, text: &str) {
        self.insert(self.rope.len_chars(), text);
    }

    /// Replace the text of one line, keeping its line ending. False if out of range.
    pub fn replace_line(&mut self, line_idx: usize, text: &str) -> bool {
        let Some(old) = self.line(line_idx) else {
            return false;
        };
        let start = self.rope.line_to_char(line_idx);
        self.rope.remove(start..start + old.chars().count());
        self.rope.insert(start, text);
        self.mark_modified();
        true
    }

    /// Replace all content
    pub fn set_text(&mut self, text: &str) {
        self.rope = Rope::from_str(text);
        self.mark_modified();
    }

    // ==================== State ====================

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    fn mark_modified(&mut self) {
        self.modified = true;
        self.version += 1;
    }

    /// Record a successful write to `path`
    pub fn mark_saved(&mut self, path: &Path) {
        self.path = Some(path.to_path_buf());
        self.modified = false;
        self.encoding = Encoding::Utf8;
        self.disk_mtime = fs::metadata(path).ok().and_then(|m| m.modified().ok());
    }

    /// File name for tab labels
    pub fn display_name(&self) -> String {
        match self.path.as_ref().and_then(|p| p.file_name()) {
            Some(name) => name.to_string_lossy().into_owned(),
            None => "untitled".to_string(),
        }
    }

    pub fn autosave_key(&self) -> Uuid {
        self.autosave_key
    }

    pub fn autosave_handle(&self) -> Option<&AutosaveHandle> {
        self.autosave.as_ref()
    }

    pub(crate) fn set_autosave_handle(&mut self, handle: Option<AutosaveHandle>) {
        self.autosave = handle;
    }

    /// True if the backing file changed on disk since we loaded or saved it
    pub fn changed_on_disk(&self) -> bool {
        if let (Some(path), Some(stored)) = (&self.path, &self.disk_mtime) {
            if let Ok(current) = fs::metadata(path).and_then(|m| m.modified()) {
                return current != *stored;
            }
        }
        false
    }
}

/// UTF-8 first, latin-1 (every byte maps to U+0000..U+00FF) on failure.
pub fn decode(bytes: Vec<u8>) -> (String, Encoding) {
    match String::from_utf8(bytes) {
        Ok(text) => (text, Encoding::Utf8),
        Err(e) => {
            let text = e.into_bytes().iter().map(|&b| b as char).collect();
            (text, Encoding::Latin1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document() {
        let doc = Document::new(DocumentId(0));
        assert!(doc.is_empty());
        assert!(!doc.is_modified());
        assert!(doc.path.is_none());
        assert_eq!(doc.display_name(), "untitled");
    }

    #[test]
    fn test_initial_content_is_unmodified() {
        let doc = Document::from_text(DocumentId(1), "int x;\n");
        assert!(!doc.is_modified());
        assert_eq!(doc.text(), "int x;\n");
    }

    #[test]
    fn test_edits_mark_modified() {
        let mut doc = Document::new(DocumentId(0));
        doc.insert(0, "Hello, World!");
        assert!(doc.is_modified());
        assert_eq!(doc.version, 1);

        doc.delete(0, 7);
        assert_eq!(doc.text(), "World!");

        doc.append("\nbye");
        assert_eq!(doc.line_count(), 2);
        assert_eq!(doc.line(1), Some("bye".to_string()));
        assert_eq!(doc.line(5), None);
    }

    #[test]
    fn test_replace_line() {
        let mut doc = Document::from_text(DocumentId(0), "int a;\r\nint b;\nint c;");
        assert!(doc.replace_line(0, "long a;"));
        assert!(doc.replace_line(2, "char c;"));
        assert!(!doc.replace_line(3, "x"));
        assert_eq!(doc.text(), "long a;\r\nint b;\nchar c;");
        assert!(doc.is_modified());
    }

    #[test]
    fn test_empty_edits_do_not_mark_modified() {
        let mut doc = Document::from_text(DocumentId(0), "abc");
        doc.insert(1, "");
        doc.delete(3, 10);
        assert!(!doc.is_modified());
    }

    #[test]
    fn test_decode_fallback() {
        let (text, enc) = decode(b"caf\xe9".to_vec());
        assert_eq!(enc, Encoding::Latin1);
        assert_eq!(text, "caf\u{e9}");

        let (text, enc) = decode("café".as_bytes().to_vec());
        assert_eq!(enc, Encoding::Utf8);
        assert_eq!(text, "café");
    }

    #[test]
    fn test_load_latin1_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.c");
        std::fs::write(&path, b"/* \xA9 1999 */\n").unwrap();

        let doc = Document::load(DocumentId(3), &path);
        assert_eq!(doc.encoding, Encoding::Latin1);
        assert!(doc.text().contains('\u{a9}'));
        assert!(!doc.is_modified());
        assert_eq!(doc.display_name(), "legacy.c");
    }

    #[test]
    fn test_load_missing_file_binds_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.c");
        let doc = Document::load(DocumentId(0), &path);
        assert!(doc.is_empty());
        assert_eq!(doc.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_unreadable_gives_placeholder() {
        // A directory cannot be read as a file
        let dir = tempfile::tempdir().unwrap();
        let doc = Document::load(DocumentId(0), dir.path());
        assert!(doc.text().starts_with("// Error loading file:"));
    }

    #[test]
    fn test_mark_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.c");
        std::fs::write(&path, "x").unwrap();

        let mut doc = Document::new(DocumentId(0));
        doc.append("x");
        doc.mark_saved(&path);
        assert!(!doc.is_modified());
        assert!(!doc.changed_on_disk());
    }
}
