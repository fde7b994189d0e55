//! TabSet: the ordered collection of open documents.
//!
//! Display order is insertion order. Exactly one tab is active at any time and
//! the collection is never observably empty: closing the last tab creates a
//! fresh untitled one before returning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::autosave::{AutosaveHandle, AutosaveStore};
use crate::core::document::Document;
use crate::core::error::FileError;
use crate::core::id::DocumentId;
use crate::core::save;

/// Asks the user where to save a document that has no path yet.
/// Returning `None` means the user cancelled.
pub trait SavePathPrompt {
    fn prompt(&mut self, doc: &Document) -> Option<PathBuf>;
}

impl<F> SavePathPrompt for F
where
    F: FnMut(&Document) -> Option<PathBuf>,
{
    fn prompt(&mut self, doc: &Document) -> Option<PathBuf> {
        self(doc)
    }
}

/// Prompt that always cancels
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl SavePathPrompt for NoPrompt {
    fn prompt(&mut self, _doc: &Document) -> Option<PathBuf> {
        None
    }
}

#[derive(Debug)]
pub struct TabSet {
    documents: HashMap<DocumentId, Document>,
    /// Display order
    order: Vec<DocumentId>,
    active: DocumentId,
    next_id: usize,
    store: AutosaveStore,
}

impl TabSet {
    /// Create a tab set holding one blank tab
    pub fn new(store: AutosaveStore) -> Self {
        let id = DocumentId(0);
        let mut documents = HashMap::new();
        documents.insert(id, Document::new(id));
        Self {
            documents,
            order: vec![id],
            active: id,
            next_id: 1,
            store,
        }
    }

    fn alloc_id(&mut self) -> DocumentId {
        let id = DocumentId(self.next_id);
        self.next_id += 1;
        id
    }

    fn push(&mut self, doc: Document) -> DocumentId {
        let id = doc.id();
        self.documents.insert(id, doc);
        self.order.push(id);
        self.active = id;
        id
    }

    // ==================== Creation ====================

    /// Create a tab and make it active.
    ///
    /// With a path and no content the file is loaded (a missing file gives an
    /// empty buffer bound to the path). Given content is used as-is; untitled
    /// content is snapshotted immediately so it survives a crash.
    pub fn create_tab(&mut self, path: Option<&Path>, content: Option<&str>) -> DocumentId {
        let id = self.alloc_id();
        let mut doc = match (path, content) {
            (Some(path), None) => Document::load(id, path),
            (path, content) => {
                let mut doc = Document::from_text(id, content.unwrap_or(""));
                doc.path = path.map(Path::to_path_buf);
                doc
            }
        };

        if path.is_none() {
            if let Some(content) = content {
                match self.store.snapshot(doc.autosave_key(), content) {
                    Ok(handle) => doc.set_autosave_handle(Some(handle)),
                    Err(e) => tracing::warn!("initial snapshot of {} failed: {}", id, e),
                }
            }
        }

        tracing::debug!("created {} ({})", id, doc.display_name());
        self.push(doc)
    }

    /// Open `path`, re-selecting its tab if it is already open
    pub fn open_file(&mut self, path: &Path) -> DocumentId {
        if let Some(id) = self.find_by_path(path) {
            self.active = id;
            return id;
        }
        self.create_tab(Some(path), None)
    }

    pub fn find_by_path(&self, path: &Path) -> Option<DocumentId> {
        let wanted = normalize(path);
        self.iter()
            .find(|doc| doc.path.as_deref().map(normalize).as_ref() == Some(&wanted))
            .map(Document::id)
    }

    /// Reopen a crash-recovery snapshot as a new, modified, untitled tab.
    /// The old snapshot is replaced by one under the new tab's key.
    pub fn restore_snapshot(&mut self, handle: &AutosaveHandle) -> Option<DocumentId> {
        let content = self.store.load(handle.key)?;
        let id = self.alloc_id();
        let mut doc = Document::new(id);
        doc.set_text(&content);
        match self.store.snapshot(doc.autosave_key(), &content) {
            Ok(fresh) => {
                doc.set_autosave_handle(Some(fresh));
                self.store.remove(handle.key);
            }
            Err(e) => tracing::warn!("could not re-key snapshot {}: {}", handle.key, e),
        }
        Some(self.push(doc))
    }

    // ==================== Access ====================

    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Always false once construction returns
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tab ids in display order
    pub fn ids(&self) -> &[DocumentId] {
        &self.order
    }

    /// Documents in display order
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.order.iter().filter_map(|id| self.documents.get(id))
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.documents.contains_key(&id)
    }

    pub fn get(&self, id: DocumentId) -> Option<&Document> {
        self.documents.get(&id)
    }

    pub fn get_mut(&mut self, id: DocumentId) -> Option<&mut Document> {
        self.documents.get_mut(&id)
    }

    pub fn active_id(&self) -> DocumentId {
        self.active
    }

    pub fn active(&self) -> &Document {
        &self.documents[&self.active]
    }

    pub fn active_mut(&mut self) -> &mut Document {
        let active = self.active;
        self.documents
            .entry(active)
            .or_insert_with(|| Document::new(active))
    }

    pub fn store(&self) -> &AutosaveStore {
        &self.store
    }

    // ==================== Selection ====================

    pub fn select_tab(&mut self, id: DocumentId) -> bool {
        if self.contains(id) {
            self.active = id;
            true
        } else {
            false
        }
    }

    /// Activate the tab at a display position
    pub fn select_index(&mut self, index: usize) -> Option<DocumentId> {
        let id = *self.order.get(index)?;
        self.active = id;
        Some(id)
    }

    pub fn position(&self, id: DocumentId) -> Option<usize> {
        self.order.iter().position(|&t| t == id)
    }

    /// Move to the next tab, wrapping around
    pub fn next_tab(&mut self) -> DocumentId {
        if let Some(pos) = self.position(self.active) {
            self.active = self.order[(pos + 1) % self.order.len()];
        }
        self.active
    }

    /// Move to the previous tab, wrapping around
    pub fn prev_tab(&mut self) -> DocumentId {
        if let Some(pos) = self.position(self.active) {
            let len = self.order.len();
            self.active = self.order[(pos + len - 1) % len];
        }
        self.active
    }

    // ==================== Closing ====================

    /// Remove a tab. The caller is responsible for offering a save first
    /// (see [`TabSet::is_modified`]). Closing the active tab activates the first
    /// remaining tab; closing the last tab leaves one fresh blank tab.
    pub fn close_tab(&mut self, id: DocumentId) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        self.order.remove(pos);
        if let Some(doc) = self.documents.remove(&id) {
            self.store.remove(doc.autosave_key());
        }

        if self.order.is_empty() {
            let blank = self.alloc_id();
            self.push(Document::new(blank));
        } else if self.active == id {
            self.active = self.order[0];
        }
        tracing::debug!("closed {}", id);
        true
    }

    /// Close every tab except `keep`
    pub fn close_other_tabs(&mut self, keep: DocumentId) {
        if !self.contains(keep) {
            return;
        }
        let others: Vec<DocumentId> = self.order.iter().copied().filter(|&t| t != keep).collect();
        for id in others {
            self.close_tab(id);
        }
        self.active = keep;
    }

    /// Close everything, leaving a single blank tab
    pub fn close_all_tabs(&mut self) {
        let all: Vec<DocumentId> = self.order.clone();
        for id in all {
            self.close_tab(id);
        }
    }

    // ==================== Saving ====================

    pub fn is_modified(&self, id: DocumentId) -> bool {
        self.documents.get(&id).is_some_and(Document::is_modified)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.documents.values().any(Document::is_modified)
    }

    pub fn modified_ids(&self) -> Vec<DocumentId> {
        self.order
            .iter()
            .copied()
            .filter(|&id| self.is_modified(id))
            .collect()
    }

    /// Save a tab to its path, asking `prompt` for one if it has none.
    ///
    /// Returns `Ok(false)` when the prompt was cancelled; the document keeps its
    /// modified flag in that case. A failed write leaves any existing file
    /// untouched and the document still modified.
    pub fn save_tab(
        &mut self,
        id: DocumentId,
        prompt: &mut impl SavePathPrompt,
    ) -> Result<bool, FileError> {
        let doc = self.documents.get(&id).ok_or(FileError::UnknownTab(id))?;
        let path = match doc.path.clone() {
            Some(path) => path,
            None => match prompt.prompt(doc) {
                Some(path) => path,
                None => return Ok(false),
            },
        };
        self.write_to(id, &path)?;
        Ok(true)
    }

    /// Save a tab under a newly prompted path
    pub fn save_tab_as(
        &mut self,
        id: DocumentId,
        prompt: &mut impl SavePathPrompt,
    ) -> Result<bool, FileError> {
        let doc = self.documents.get(&id).ok_or(FileError::UnknownTab(id))?;
        let Some(path) = prompt.prompt(doc) else {
            return Ok(false);
        };
        self.write_to(id, &path)?;
        Ok(true)
    }

    fn write_to(&mut self, id: DocumentId, path: &Path) -> Result<(), FileError> {
        let doc = self
            .documents
            .get_mut(&id)
            .ok_or(FileError::UnknownTab(id))?;
        save::write_rope(path, doc.rope())?;
        doc.mark_saved(path);
        self.store.remove(doc.autosave_key());
        doc.set_autosave_handle(None);
        tracing::info!("saved {} to {}", id, path.display());
        Ok(())
    }

    /// Save every modified tab. True only when all of them were written.
    pub fn save_all(&mut self, prompt: &mut impl SavePathPrompt) -> bool {
        let mut all_saved = true;
        for id in self.modified_ids() {
            match self.save_tab(id, prompt) {
                Ok(true) => {}
                Ok(false) => all_saved = false,
                Err(e) => {
                    tracing::warn!("save of {} failed: {}", id, e);
                    all_saved = false;
                }
            }
        }
        all_saved
    }

    // ==================== Autosave ====================

    /// Snapshot every modified tab. Failures are logged and skipped.
    pub fn autosave_all(&mut self) -> usize {
        let mut written = 0;
        for id in self.order.clone() {
            let Some(doc) = self.documents.get_mut(&id) else {
                continue;
            };
            if !doc.is_modified() {
                continue;
            }
            match self.store.snapshot(doc.autosave_key(), &doc.text()) {
                Ok(handle) => {
                    doc.set_autosave_handle(Some(handle));
                    written += 1;
                }
                Err(e) => tracing::warn!("autosave of {} failed: {}", id, e),
            }
        }
        written
    }

    /// Backing paths of all file-backed tabs, in display order
    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.iter().filter_map(|doc| doc.path.clone()).collect()
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
