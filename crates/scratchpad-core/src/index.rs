//! In-memory registry of libraries and documents.
//!
//! The `Index` maps library identifiers to [`Library`] values and document
//! identifiers to [`Document`] values. It supports:
//!
//! - Atomic replacement of the whole content generation (after a walk or a
//!   snapshot load)
//! - Single-document inclusion and in-place refresh
//! - Read-only selection by library, by identifier or "all"
//!
//! ## Consistency
//!
//! All state lives behind one `RwLock`. A new generation is assembled and
//! validated before the lock is taken, then swapped in with a single write, so
//! readers see either the previous or the next generation in full. Documents
//! are shared as `Arc<Document>` and never mutated once indexed; a refresh
//! replaces the slot.
//!
//! Walking, loading and snapshot handling are not done here. They are reached
//! through the [`IndexHooks`] installed at construction.

use crate::document::Document;
use crate::error::{IndexError, Result};
use crate::hooks::IndexHooks;
use crate::library::Library;
use crate::types::{DocumentId, LibraryId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Summary of the index contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub library_count: usize,
    pub document_count: usize,
    /// Reference time of the last successful load or walk
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone)]
struct IndexState {
    libraries: BTreeMap<LibraryId, Arc<Library>>,
    documents: BTreeMap<DocumentId, Arc<Document>>,
}

impl IndexState {
    fn insert_document(&mut self, document: Arc<Document>) -> Result<()> {
        if !self.libraries.contains_key(document.library()) {
            return Err(IndexError::UnknownLibrary {
                document: document.id.to_string(),
                library: document.library().to_string(),
            });
        }
        if self.documents.contains_key(&document.id) {
            return Err(IndexError::DuplicateDocument {
                identifier: document.id.to_string(),
            });
        }
        self.documents.insert(document.id.clone(), document);
        Ok(())
    }
}

/// The in-memory index.
pub struct Index {
    state: RwLock<IndexState>,
    refreshed_at: RwLock<Option<DateTime<Utc>>>,
    hooks: IndexHooks,
    /// Bumped on every content change
    generation: AtomicU64,
}

impl Default for Index {
    fn default() -> Self {
        Self::new(IndexHooks::none())
    }
}

impl Index {
    /// Create an empty index with the given capabilities.
    pub fn new(hooks: IndexHooks) -> Self {
        Index {
            state: RwLock::new(IndexState::default()),
            refreshed_at: RwLock::new(None),
            hooks,
            generation: AtomicU64::new(0),
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    /// Check if the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.state.read().documents.is_empty()
    }

    /// Get the current generation (modification counter).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> IndexStats {
        let state = self.state.read();
        IndexStats {
            library_count: state.libraries.len(),
            document_count: state.documents.len(),
            refreshed_at: self.refresh_timestamp(),
        }
    }

    // === Mutation ===

    /// Drop every library and document.
    ///
    /// Prefer [`Index::replace_all`], which clears and repopulates in one step.
    pub fn clear(&self) {
        *self.state.write() = IndexState::default();
        self.generation.fetch_add(1, Ordering::Release);
        debug!("Index cleared");
    }

    /// Register a library, replacing any previous one with the same identifier.
    pub fn include_library(&self, library: Library) {
        debug!(library = %library.id, "Including library");
        self.state
            .write()
            .libraries
            .insert(library.id.clone(), Arc::new(library));
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Register one document and mark the snapshot dirty.
    pub fn include_document(&self, document: Document) -> Result<()> {
        self.state.write().insert_document(Arc::new(document))?;
        self.generation.fetch_add(1, Ordering::Release);
        self.mark_dirty()?;
        Ok(())
    }

    /// Replace the whole content with a freshly computed generation.
    ///
    /// The new state is validated first; on error the index is left untouched.
    /// Dirty marking does not happen here: the new generation is the fresh one.
    #[instrument(skip_all, fields(libraries = libraries.len(), documents = documents.len()))]
    pub fn replace_all(&self, libraries: Vec<Library>, documents: Vec<Document>) -> Result<()> {
        let mut next = IndexState::default();
        for library in libraries {
            next.libraries.insert(library.id.clone(), Arc::new(library));
        }
        for document in documents {
            next.insert_document(Arc::new(document))?;
        }

        let (library_count, document_count) = (next.libraries.len(), next.documents.len());
        *self.state.write() = next;
        self.generation.fetch_add(1, Ordering::Release);

        info!(
            libraries = library_count,
            documents = document_count,
            "Index contents replaced"
        );
        Ok(())
    }

    // === Queries ===

    /// Resolve a library by identifier.
    pub fn resolve_library(&self, identifier: &str) -> Result<Arc<Library>> {
        let not_found = || IndexError::LibraryNotFound {
            identifier: identifier.to_string(),
        };
        let id = LibraryId::new(identifier).map_err(|_| not_found())?;
        self.state.read().libraries.get(&id).cloned().ok_or_else(not_found)
    }

    /// Resolve a document by its `library:token` identifier.
    pub fn resolve_document(&self, identifier: &str) -> Result<Arc<Document>> {
        let id = DocumentId::parse(identifier)?;
        self.document(&id)
    }

    /// Look up a document by parsed identifier.
    pub fn document(&self, id: &DocumentId) -> Result<Arc<Document>> {
        self.state
            .read()
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| IndexError::DocumentNotFound {
                identifier: id.to_string(),
            })
    }

    /// All libraries, ordered by identifier.
    pub fn libraries(&self) -> Vec<Arc<Library>> {
        self.state.read().libraries.values().cloned().collect()
    }

    /// All documents, ordered by identifier.
    pub fn select_all(&self) -> Vec<Arc<Document>> {
        self.state.read().documents.values().cloned().collect()
    }

    /// Documents of one library, ordered by identifier.
    pub fn select_in_library(&self, identifier: &str) -> Result<Vec<Arc<Document>>> {
        let library = self.resolve_library(identifier)?;
        let state = self.state.read();
        Ok(state
            .documents
            .values()
            .filter(|d| d.library() == &library.id)
            .cloned()
            .collect())
    }

    // === Refresh ===

    /// Reference time of the last successful load or walk.
    pub fn refresh_timestamp(&self) -> Option<DateTime<Utc>> {
        *self.refreshed_at.read()
    }

    pub fn set_refresh_timestamp(&self, timestamp: DateTime<Utc>) {
        *self.refreshed_at.write() = Some(timestamp);
    }

    pub fn libraries_refresh_enabled(&self) -> bool {
        self.hooks.libraries.is_some()
    }

    pub fn documents_refresh_enabled(&self) -> bool {
        self.hooks.documents.is_some()
    }

    pub fn dirty_enabled(&self) -> bool {
        self.hooks.dirty.is_some()
    }

    /// Re-validate all libraries through the installed refresher.
    ///
    /// Returns `false` when library refresh is disabled.
    pub fn refresh_libraries(&self) -> Result<bool> {
        let Some(refresher) = self.hooks.libraries.clone() else {
            return Ok(false);
        };
        refresher.refresh_libraries(self)?;
        Ok(true)
    }

    /// Return the current version of a document, re-reading it first when
    /// document refresh is enabled and its file changed.
    ///
    /// A replaced document also marks the snapshot dirty.
    pub fn refresh_document(&self, identifier: &str) -> Result<Arc<Document>> {
        let current = self.resolve_document(identifier)?;
        let Some(refresher) = self.hooks.documents.clone() else {
            return Ok(current);
        };
        let Some(refreshed) = refresher.refresh_document(self, &current)? else {
            return Ok(current);
        };

        let refreshed = Arc::new(refreshed);
        {
            let mut state = self.state.write();
            state.documents.remove(&current.id);
            state.insert_document(refreshed.clone())?;
        }
        self.generation.fetch_add(1, Ordering::Release);
        debug!(document = %refreshed.id, "Document refreshed");

        self.mark_dirty()?;
        Ok(refreshed)
    }

    /// Mark the persisted snapshot stale, if dirty tracking is enabled.
    ///
    /// The marker time becomes the refresh timestamp: this index already holds
    /// the content the marker refers to. Returns `false` when disabled.
    pub fn mark_dirty(&self) -> Result<bool> {
        let Some(marker) = self.hooks.dirty.clone() else {
            return Ok(false);
        };
        let timestamp = marker.mark_dirty(self)?;
        self.set_refresh_timestamp(timestamp);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::document::DocumentFormat;
    use crate::hooks::{DirtyMarker, Refresher};
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn library(id: &str, root: &Path) -> Library {
        Library::initialize(&LibraryConfig {
            identifier: id.to_string(),
            paths: vec![root.to_path_buf()],
            ..Default::default()
        })
        .unwrap()
    }

    fn document(library: &str, token: &str) -> Document {
        Document {
            id: DocumentId::format(library, token).unwrap(),
            path: PathBuf::from(format!("/{}/{}.md", library, token)),
            root: PathBuf::from(format!("/{}", library)),
            format: DocumentFormat::Commonmark,
            title: token.to_string(),
            title_alternatives: Vec::new(),
            body_lines: vec![format!("# {}", token)],
            edit_enabled: false,
            modified: None,
        }
    }

    fn ids(documents: &[Arc<Document>]) -> Vec<String> {
        documents.iter().map(|d| d.id.to_string()).collect()
    }

    #[derive(Default)]
    struct CountingMarker {
        calls: AtomicUsize,
    }

    impl DirtyMarker for CountingMarker {
        fn mark_dirty(&self, _index: &Index) -> Result<DateTime<Utc>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Utc::now())
        }
    }

    struct ReplacingRefresher {
        replacement: Mutex<Option<Document>>,
    }

    impl Refresher for ReplacingRefresher {
        fn refresh_libraries(&self, _index: &Index) -> Result<()> {
            Ok(())
        }

        fn refresh_document(&self, _index: &Index, _document: &Document) -> Result<Option<Document>> {
            Ok(self.replacement.lock().take())
        }
    }

    #[test]
    fn test_clear_then_repopulate() {
        let temp_dir = TempDir::new().unwrap();
        let index = Index::default();
        index
            .replace_all(
                vec![library("notes", temp_dir.path())],
                vec![document("notes", "old-a"), document("notes", "old-b")],
            )
            .unwrap();
        assert_eq!(index.len(), 2);

        index.clear();
        assert!(index.is_empty());
        index.include_library(library("notes", temp_dir.path()));
        index.include_document(document("notes", "new")).unwrap();

        assert_eq!(ids(&index.select_all()), vec!["notes:new"]);
    }

    #[test]
    fn test_replace_all_drops_previous_generation() {
        let temp_dir = TempDir::new().unwrap();
        let index = Index::default();
        index
            .replace_all(
                vec![library("notes", temp_dir.path())],
                vec![document("notes", "one")],
            )
            .unwrap();
        let before = index.generation();

        index
            .replace_all(
                vec![library("notes", temp_dir.path())],
                vec![document("notes", "two"), document("notes", "three")],
            )
            .unwrap();
        assert!(index.generation() > before);
        assert_eq!(ids(&index.select_all()), vec!["notes:three", "notes:two"]);
    }

    #[test]
    fn test_failed_replace_leaves_index_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let index = Index::default();
        index
            .replace_all(
                vec![library("notes", temp_dir.path())],
                vec![document("notes", "keep")],
            )
            .unwrap();

        let err = index
            .replace_all(
                vec![library("notes", temp_dir.path())],
                vec![document("notes", "dup"), document("notes", "dup")],
            )
            .unwrap_err();
        assert!(matches!(err, IndexError::DuplicateDocument { .. }));
        assert_eq!(ids(&index.select_all()), vec!["notes:keep"]);
    }

    #[test]
    fn test_same_token_in_different_libraries() {
        let temp_dir = TempDir::new().unwrap();
        let index = Index::default();
        index
            .replace_all(
                vec![library("lib1", temp_dir.path()), library("lib2", temp_dir.path())],
                vec![document("lib1", "intro"), document("lib2", "intro")],
            )
            .unwrap();

        assert_eq!(ids(&index.select_all()), vec!["lib1:intro", "lib2:intro"]);
        assert_eq!(ids(&index.select_in_library("lib2").unwrap()), vec!["lib2:intro"]);
    }

    #[test]
    fn test_document_requires_registered_library() {
        let index = Index::default();
        let err = index.include_document(document("ghost", "a")).unwrap_err();
        assert!(matches!(err, IndexError::UnknownLibrary { .. }));
    }

    #[test]
    fn test_lookups() {
        let temp_dir = TempDir::new().unwrap();
        let index = Index::default();
        index.include_library(library("notes", temp_dir.path()));
        index.include_document(document("notes", "intro")).unwrap();

        assert_eq!(index.resolve_library("notes").unwrap().id.as_str(), "notes");
        assert!(matches!(
            index.resolve_library("other"),
            Err(IndexError::LibraryNotFound { .. })
        ));
        assert!(matches!(
            index.resolve_library("Not Valid"),
            Err(IndexError::LibraryNotFound { .. })
        ));
        assert!(matches!(
            index.select_in_library("other"),
            Err(IndexError::LibraryNotFound { .. })
        ));

        assert_eq!(index.resolve_document("notes:intro").unwrap().title, "intro");
        assert!(matches!(
            index.resolve_document("notes:intr"),
            Err(IndexError::DocumentNotFound { .. })
        ));
        assert!(matches!(
            index.resolve_document("intro"),
            Err(IndexError::InvalidDocumentIdentifier { .. })
        ));
    }

    #[test]
    fn test_include_marks_dirty_but_bulk_load_does_not() {
        let temp_dir = TempDir::new().unwrap();
        let marker = Arc::new(CountingMarker::default());
        let index = Index::new(IndexHooks {
            dirty: Some(marker.clone()),
            ..Default::default()
        });

        index
            .replace_all(
                vec![library("notes", temp_dir.path())],
                vec![document("notes", "a"), document("notes", "b")],
            )
            .unwrap();
        assert_eq!(marker.calls.load(Ordering::SeqCst), 0);
        assert!(index.refresh_timestamp().is_none());

        index.include_document(document("notes", "c")).unwrap();
        assert_eq!(marker.calls.load(Ordering::SeqCst), 1);
        assert!(index.refresh_timestamp().is_some());
    }

    #[test]
    fn test_refresh_document_replaces_slot() {
        let temp_dir = TempDir::new().unwrap();
        let mut updated = document("notes", "intro");
        updated.title = "Updated".to_string();

        let marker = Arc::new(CountingMarker::default());
        let refresher = Arc::new(ReplacingRefresher {
            replacement: Mutex::new(Some(updated)),
        });
        let index = Index::new(IndexHooks {
            documents: Some(refresher),
            dirty: Some(marker.clone()),
            ..Default::default()
        });
        index
            .replace_all(
                vec![library("notes", temp_dir.path())],
                vec![document("notes", "intro")],
            )
            .unwrap();
        let held = index.resolve_document("notes:intro").unwrap();

        let refreshed = index.refresh_document("notes:intro").unwrap();
        assert_eq!(refreshed.title, "Updated");
        assert_eq!(index.resolve_document("notes:intro").unwrap().title, "Updated");
        assert_eq!(held.title, "intro");
        assert_eq!(marker.calls.load(Ordering::SeqCst), 1);

        // Nothing changed the second time around
        let again = index.refresh_document("notes:intro").unwrap();
        assert!(Arc::ptr_eq(&again, &refreshed));
        assert_eq!(marker.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_hooks() {
        let temp_dir = TempDir::new().unwrap();
        let index = Index::default();
        index.include_library(library("notes", temp_dir.path()));
        index.include_document(document("notes", "intro")).unwrap();

        assert!(!index.libraries_refresh_enabled());
        assert!(!index.refresh_libraries().unwrap());
        assert!(!index.mark_dirty().unwrap());
        assert_eq!(index.refresh_document("notes:intro").unwrap().title, "intro");
    }
}
