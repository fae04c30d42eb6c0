//! Deciding between snapshot load and walk.
//!
//! The [`Coordinator`] owns the initialized libraries, the index switches and
//! the [`SnapshotStore`]. On [`Coordinator::synchronize`] it compares the
//! snapshot and dirty-marker modification times with the index's refresh
//! timestamp and then either does nothing, loads the snapshot, or walks every
//! library and stores the result.
//!
//! It also implements [`Refresher`] and [`DirtyMarker`]; [`Coordinator::open`]
//! installs it on the index for whichever capabilities the switches allow.

use crate::config::IndexConfig;
use crate::document::{load_document, load_documents, Document};
use crate::error::{IndexError, Result};
use crate::hooks::{DirtyMarker, IndexHooks, Refresher};
use crate::index::Index;
use crate::library::Library;
use crate::persistence::{SnapshotLoad, SnapshotStore};
use crate::walker::{walk_libraries, Candidate};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Switches controlling how the index is populated and kept fresh.
///
/// Everything that touches the snapshot requires `database_path`.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Where the snapshot lives; `None` disables the database entirely
    pub database_path: Option<PathBuf>,
    pub walk_enabled: bool,
    pub load_enabled: bool,
    pub store_enabled: bool,
    pub dirty_enabled: bool,
    pub refresh_enabled: bool,
    pub libraries_refresh_enabled: bool,
    pub documents_refresh_enabled: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            database_path: None,
            walk_enabled: true,
            load_enabled: true,
            store_enabled: true,
            dirty_enabled: true,
            refresh_enabled: true,
            libraries_refresh_enabled: true,
            documents_refresh_enabled: true,
        }
    }
}

impl IndexOptions {
    /// Options from the `[index]` section and an already resolved database path.
    pub fn from_config(config: &IndexConfig, database_path: Option<PathBuf>) -> Self {
        IndexOptions {
            database_path: if config.database_enabled { database_path } else { None },
            libraries_refresh_enabled: config.libraries_refresh_enabled,
            documents_refresh_enabled: config.documents_refresh_enabled,
            ..Default::default()
        }
    }

    pub fn database_enabled(&self) -> bool {
        self.database_path.is_some()
    }

    fn can_load(&self) -> bool {
        self.load_enabled && self.database_enabled()
    }

    fn can_store(&self) -> bool {
        self.store_enabled && self.database_enabled()
    }

    fn can_dirty(&self) -> bool {
        self.dirty_enabled && self.database_enabled()
    }

    fn can_refresh(&self) -> bool {
        self.refresh_enabled && self.walk_enabled && self.database_enabled()
    }
}

/// What a synchronization run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The index is already as fresh as the snapshot
    Unchanged,
    /// Contents came from the snapshot
    Loaded,
    /// Contents came from walking the libraries
    Walked,
}

/// Populates an [`Index`] from the snapshot or the file system.
#[derive(Debug)]
pub struct Coordinator {
    libraries: Vec<Library>,
    options: IndexOptions,
    store: Option<SnapshotStore>,
}

impl Coordinator {
    pub fn new(libraries: Vec<Library>, options: IndexOptions) -> Self {
        let store = options.database_path.as_ref().map(SnapshotStore::new);
        Coordinator {
            libraries,
            options,
            store,
        }
    }

    /// Build an index wired to a new coordinator and synchronize it once.
    pub fn open(libraries: Vec<Library>, options: IndexOptions) -> Result<(Index, Arc<Coordinator>)> {
        let coordinator = Arc::new(Coordinator::new(libraries, options));
        let index = Index::new(coordinator.hooks());
        coordinator.synchronize(&index)?;
        Ok((index, coordinator))
    }

    /// Hooks for the capabilities the options allow.
    pub fn hooks(self: &Arc<Self>) -> IndexHooks {
        let options = &self.options;
        let refresher = || Some(self.clone() as Arc<dyn Refresher>);
        IndexHooks {
            libraries: if options.can_refresh() && options.libraries_refresh_enabled {
                refresher()
            } else {
                None
            },
            documents: if options.can_refresh() && options.documents_refresh_enabled {
                refresher()
            } else {
                None
            },
            dirty: if options.can_dirty() {
                Some(self.clone() as Arc<dyn DirtyMarker>)
            } else {
                None
            },
        }
    }

    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// The snapshot store, when the database is enabled.
    pub fn store(&self) -> Option<&SnapshotStore> {
        self.store.as_ref()
    }

    /// Bring the index up to date with the snapshot or the file system.
    #[instrument(skip_all)]
    pub fn synchronize(&self, index: &Index) -> Result<SyncOutcome> {
        let start = Instant::now();
        let options = &self.options;

        let mut should_walk = options.walk_enabled;
        let mut should_store = options.can_store();
        let mut timestamp: Option<DateTime<Utc>> = None;

        let loadable_store = self.store.as_ref().filter(|_| options.can_load());
        let mut should_load = false;

        if let Some(store) = loadable_store {
            timestamp = store.modified()?;
            should_load = timestamp.is_some();
            if should_load && options.can_dirty() {
                if let Some(dirty) = store.dirty_modified()? {
                    if Some(dirty) > timestamp {
                        debug!(marker = %dirty, "Snapshot not loaded (dirty)");
                        should_load = false;
                        timestamp = Some(dirty);
                    }
                }
            }
        }

        if should_load {
            if let (Some(candidate), Some(refreshed)) = (timestamp, index.refresh_timestamp()) {
                if candidate <= refreshed {
                    debug!("Snapshot not loaded (unchanged)");
                    return Ok(SyncOutcome::Unchanged);
                }
            }
        }

        let mut outcome = None;
        if let Some(store) = loadable_store.filter(|_| should_load) {
            match store.load()? {
                SnapshotLoad::Loaded(snapshot) if snapshot.matches_libraries(&self.libraries) => {
                    index.replace_all(self.libraries.clone(), snapshot.documents)?;
                    outcome = Some(SyncOutcome::Loaded);
                    should_walk = false;
                    should_store = false;
                }
                SnapshotLoad::Loaded(_) => {
                    info!("Snapshot not loaded (library configuration changed)");
                }
                SnapshotLoad::Incompatible { found, expected } => {
                    warn!(found, expected, "Snapshot not loaded (incompatible version)");
                }
            }
        }

        if should_walk {
            timestamp = Some(Utc::now());
            self.walk_and_load(index)?;
            outcome = Some(SyncOutcome::Walked);
        }

        let Some(outcome) = outcome else {
            return Err(IndexError::NoDocumentSource);
        };

        index.set_refresh_timestamp(timestamp.unwrap_or_else(Utc::now));

        if should_store {
            if let Some(ref store) = self.store {
                store.save(index)?;
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let walked = outcome == SyncOutcome::Walked;
        if (walked && elapsed_ms >= 200) || (!walked && elapsed_ms > 75) {
            debug!(elapsed_ms, walked, "Index loading was slow");
        }
        info!(outcome = ?outcome, documents = index.len(), elapsed_ms, "Index synchronized");

        Ok(outcome)
    }

    /// Walk every library unconditionally and store the result when allowed.
    #[instrument(skip_all)]
    pub fn rebuild(&self, index: &Index) -> Result<()> {
        if !self.options.walk_enabled {
            return Err(IndexError::NoDocumentSource);
        }
        let timestamp = Utc::now();
        self.walk_and_load(index)?;
        index.set_refresh_timestamp(timestamp);
        if let Some(store) = self.store.as_ref().filter(|_| self.options.can_store()) {
            store.save(index)?;
        }
        Ok(())
    }

    fn walk_and_load(&self, index: &Index) -> Result<()> {
        let candidates = walk_libraries(&self.libraries)?;
        let mut documents = Vec::new();
        for (library, candidates) in self.libraries.iter().zip(&candidates) {
            documents.extend(load_documents(library, candidates)?);
        }
        index.replace_all(self.libraries.clone(), documents)
    }
}

impl Refresher for Coordinator {
    fn refresh_libraries(&self, index: &Index) -> Result<()> {
        if !self.options.can_load() {
            return Ok(());
        }
        self.synchronize(index).map(|_| ())
    }

    fn refresh_document(&self, index: &Index, document: &Document) -> Result<Option<Document>> {
        let modified = match fs::metadata(&document.path).and_then(|m| m.modified()) {
            Ok(time) => DateTime::<Utc>::from(time),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(IndexError::DocumentNotFound {
                    identifier: document.id.to_string(),
                });
            }
            Err(e) => return Err(IndexError::io("stat document", &document.path, e)),
        };
        if document.modified == Some(modified) {
            return Ok(None);
        }

        let library = index.resolve_library(document.library().as_str())?;
        let candidate = Candidate {
            root: document.root.clone(),
            path: document.path.clone(),
        };
        let refreshed = load_document(&library, &candidate)?;
        debug!(document = %refreshed.id, "Document changed on disk");
        Ok(Some(refreshed))
    }
}

impl DirtyMarker for Coordinator {
    fn mark_dirty(&self, _index: &Index) -> Result<DateTime<Utc>> {
        match self.store {
            Some(ref store) if self.options.can_dirty() => store.touch_dirty(),
            _ => Ok(Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::persistence::SNAPSHOT_VERSION;
    use chrono::Duration;
    use std::fs::File;
    use std::path::Path;
    use std::time::SystemTime;
    use tempfile::TempDir;

    struct Fixture {
        notes: TempDir,
        cache: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let fixture = Fixture {
                notes: TempDir::new().unwrap(),
                cache: TempDir::new().unwrap(),
            };
            fixture.write("intro.md", "# Introduction\n");
            fixture.write("journal/monday.md", "# Monday\n");
            fixture
        }

        fn write(&self, relative: &str, contents: &str) -> PathBuf {
            let path = self.notes.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, contents).unwrap();
            path
        }

        fn libraries(&self, include: &str) -> Vec<Library> {
            vec![Library::initialize(&LibraryConfig {
                identifier: "notes".to_string(),
                paths: vec![self.notes.path().to_path_buf()],
                include_glob_patterns: vec![include.to_string()],
                use_file_extension_as_format: true,
                ..Default::default()
            })
            .unwrap()]
        }

        fn options(&self) -> IndexOptions {
            IndexOptions {
                database_path: Some(self.cache.path().join("notes.db")),
                ..Default::default()
            }
        }

        fn open(&self, options: IndexOptions) -> Result<(Index, Arc<Coordinator>)> {
            Coordinator::open(self.libraries("**/*.md"), options)
        }

        fn store(&self) -> SnapshotStore {
            SnapshotStore::new(self.cache.path().join("notes.db"))
        }
    }

    fn set_mtime(path: &Path, time: DateTime<Utc>) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::from(time)).unwrap();
    }

    fn ids(index: &Index) -> Vec<String> {
        index.select_all().iter().map(|d| d.id.to_string()).collect()
    }

    #[test]
    fn test_no_snapshot_walks_and_stores() {
        let fixture = Fixture::new();
        let options = IndexOptions {
            dirty_enabled: false,
            ..fixture.options()
        };

        let (index, coordinator) = fixture.open(options).unwrap();
        assert_eq!(ids(&index), vec!["notes:intro", "notes:journal/monday"]);
        assert!(fixture.store().exists());
        assert!(index.refresh_timestamp().is_some());
        assert!(!index.dirty_enabled());
        assert!(coordinator.store().is_some());
    }

    #[test]
    fn test_fresh_snapshot_is_loaded() {
        let fixture = Fixture::new();
        fixture.open(fixture.options()).unwrap();

        // Not visible unless the tree is walked again
        fixture.write("later.md", "# Later\n");

        let (index, coordinator) = fixture.open(fixture.options()).unwrap();
        assert_eq!(ids(&index), vec!["notes:intro", "notes:journal/monday"]);
        assert_eq!(index.refresh_timestamp(), fixture.store().modified().unwrap());
        assert_eq!(coordinator.synchronize(&index).unwrap(), SyncOutcome::Unchanged);
    }

    #[test]
    fn test_newer_dirty_marker_forces_walk() {
        let fixture = Fixture::new();
        fixture.open(fixture.options()).unwrap();
        fixture.write("later.md", "# Later\n");

        let store = fixture.store();
        let snapshot_time = store.modified().unwrap().unwrap();
        store.touch_dirty().unwrap();
        set_mtime(&store.dirty_path(), snapshot_time + Duration::seconds(10));

        let (index, coordinator) = fixture.open(fixture.options()).unwrap();
        assert_eq!(
            ids(&index),
            vec!["notes:intro", "notes:journal/monday", "notes:later"]
        );

        set_mtime(&store.dirty_path(), snapshot_time - Duration::seconds(10));
        let fresh = Index::new(coordinator.hooks());
        assert_eq!(coordinator.synchronize(&fresh).unwrap(), SyncOutcome::Loaded);
    }

    #[test]
    fn test_dirty_tracking_disabled_ignores_marker() {
        let fixture = Fixture::new();
        fixture.open(fixture.options()).unwrap();

        let store = fixture.store();
        let snapshot_time = store.modified().unwrap().unwrap();
        store.touch_dirty().unwrap();
        set_mtime(&store.dirty_path(), snapshot_time + Duration::seconds(10));

        let options = IndexOptions {
            dirty_enabled: false,
            ..fixture.options()
        };
        let coordinator = Coordinator::new(fixture.libraries("**/*.md"), options);
        let index = Index::default();
        assert_eq!(coordinator.synchronize(&index).unwrap(), SyncOutcome::Loaded);
    }

    #[test]
    fn test_incompatible_snapshot_falls_back_to_walk() {
        let fixture = Fixture::new();
        fixture.open(fixture.options()).unwrap();

        let store = fixture.store();
        let mut bytes = fs::read(store.path()).unwrap();
        bytes[4..8].copy_from_slice(&(SNAPSHOT_VERSION + 7).to_le_bytes());
        fs::write(store.path(), bytes).unwrap();

        let coordinator = Coordinator::new(fixture.libraries("**/*.md"), fixture.options());
        let index = Index::default();
        assert_eq!(coordinator.synchronize(&index).unwrap(), SyncOutcome::Walked);
        assert!(matches!(store.load().unwrap(), SnapshotLoad::Loaded(_)));
    }

    #[test]
    fn test_changed_configuration_falls_back_to_walk() {
        let fixture = Fixture::new();
        fixture.write("todo.txt", "Buy milk\n");
        fixture.open(fixture.options()).unwrap();

        let coordinator = Coordinator::new(fixture.libraries("**/*.{md,txt}"), fixture.options());
        let index = Index::default();
        assert_eq!(coordinator.synchronize(&index).unwrap(), SyncOutcome::Walked);
        assert_eq!(
            ids(&index),
            vec!["notes:intro", "notes:journal/monday", "notes:todo"]
        );
    }

    #[test]
    fn test_walk_disabled_without_snapshot() {
        let fixture = Fixture::new();
        let options = IndexOptions {
            walk_enabled: false,
            ..fixture.options()
        };
        assert!(matches!(
            fixture.open(options),
            Err(IndexError::NoDocumentSource)
        ));
    }

    #[test]
    fn test_walk_disabled_with_snapshot() {
        let fixture = Fixture::new();
        fixture.open(fixture.options()).unwrap();

        let options = IndexOptions {
            walk_enabled: false,
            ..fixture.options()
        };
        let (index, _) = fixture.open(options).unwrap();
        assert_eq!(index.len(), 2);
        assert!(!index.libraries_refresh_enabled());
        assert!(!index.documents_refresh_enabled());
    }

    #[test]
    fn test_database_disabled() {
        let fixture = Fixture::new();
        let (index, coordinator) = fixture.open(IndexOptions::default()).unwrap();

        assert_eq!(index.len(), 2);
        assert!(coordinator.store().is_none());
        assert!(!index.dirty_enabled());
        assert!(!index.documents_refresh_enabled());
        assert!(!fixture.store().exists());
    }

    #[test]
    fn test_corrupted_snapshot_is_fatal() {
        let fixture = Fixture::new();
        fs::write(fixture.store().path(), vec![0u8; 64]).unwrap();

        assert!(matches!(
            fixture.open(fixture.options()),
            Err(IndexError::SnapshotCorrupted { .. })
        ));
    }

    #[test]
    fn test_refresh_document_picks_up_edits() {
        let fixture = Fixture::new();
        let (index, _) = fixture.open(fixture.options()).unwrap();
        let before = index.resolve_document("notes:intro").unwrap();

        let path = fixture.write("intro.md", "# Welcome\n");
        set_mtime(&path, before.modified.unwrap() + Duration::seconds(5));

        let refreshed = index.refresh_document("notes:intro").unwrap();
        assert_eq!(refreshed.title, "Welcome");
        assert_eq!(index.resolve_document("notes:intro").unwrap().title, "Welcome");
        assert!(fixture.store().dirty_modified().unwrap().is_some());

        let again = index.refresh_document("notes:intro").unwrap();
        assert!(Arc::ptr_eq(&again, &refreshed));
    }

    #[test]
    fn test_refresh_vanished_document() {
        let fixture = Fixture::new();
        let (index, _) = fixture.open(fixture.options()).unwrap();

        fs::remove_file(fixture.notes.path().join("intro.md")).unwrap();
        assert!(matches!(
            index.refresh_document("notes:intro"),
            Err(IndexError::DocumentNotFound { .. })
        ));
    }

    #[test]
    fn test_refresh_libraries_after_external_edit() {
        let fixture = Fixture::new();
        let (index, _) = fixture.open(fixture.options()).unwrap();

        // Another process adds a note and marks the snapshot dirty
        fixture.write("later.md", "# Later\n");
        let store = fixture.store();
        store.touch_dirty().unwrap();
        set_mtime(
            &store.dirty_path(),
            store.modified().unwrap().unwrap() + Duration::seconds(10),
        );

        assert!(index.refresh_libraries().unwrap());
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_rebuild() {
        let fixture = Fixture::new();
        let (index, coordinator) = fixture.open(fixture.options()).unwrap();
        fixture.write("later.md", "# Later\n");

        coordinator.rebuild(&index).unwrap();
        assert_eq!(index.len(), 3);
        match fixture.store().load().unwrap() {
            SnapshotLoad::Loaded(snapshot) => assert_eq!(snapshot.documents.len(), 3),
            other => panic!("expected a loaded snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_document_aborts_walk() {
        let fixture = Fixture::new();
        fixture.write("!!!.md", "nothing usable in the name\n");

        assert!(matches!(
            fixture.open(fixture.options()),
            Err(IndexError::EmptyIdentifier { .. })
        ));
        assert!(!fixture.store().exists());
    }

    #[test]
    fn test_duplicate_file_names_abort_walk() {
        let fixture = Fixture::new();
        fixture.write("a/intro.md", "# First\n");
        fixture.write("b/intro.md", "# Second\n");
        let libraries = vec![Library::initialize(&LibraryConfig {
            identifier: "notes".to_string(),
            paths: vec![fixture.notes.path().to_path_buf()],
            use_file_name_as_identifier: true,
            use_file_extension_as_format: true,
            ..Default::default()
        })
        .unwrap()];

        match Coordinator::open(libraries, fixture.options()) {
            Err(IndexError::DuplicateDocument { identifier }) => assert_eq!(identifier, "notes:intro"),
            other => panic!("expected a duplicate document, got {:?}", other.map(|(index, _)| index.len())),
        }
        assert!(!fixture.store().exists());
    }
}
