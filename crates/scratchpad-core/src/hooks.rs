//! Refresh and dirty-marking capabilities.
//!
//! The [`Index`] never walks the file system or touches the snapshot on its own.
//! Whoever owns that logic implements these traits and hands them to the index
//! at construction through [`IndexHooks`]. An absent hook means the capability
//! is disabled.
//!
//! Every call receives the index it was invoked on, so implementors do not need
//! to hold a reference back to it.

use crate::document::Document;
use crate::error::Result;
use crate::index::Index;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Re-derives index contents from the file system.
pub trait Refresher: Send + Sync {
    /// Re-validate all libraries, replacing the index contents when they are
    /// out of date.
    fn refresh_libraries(&self, index: &Index) -> Result<()>;

    /// Re-read one document if its file changed since it was loaded.
    ///
    /// Returns `None` when the indexed copy is still current.
    fn refresh_document(&self, index: &Index, document: &Document) -> Result<Option<Document>>;
}

/// Invalidates the persisted snapshot from any process.
pub trait DirtyMarker: Send + Sync {
    /// Mark the snapshot stale and return the time recorded in the marker.
    fn mark_dirty(&self, index: &Index) -> Result<DateTime<Utc>>;
}

/// Capabilities installed on an [`Index`].
#[derive(Clone, Default)]
pub struct IndexHooks {
    /// Library-wide refresh
    pub libraries: Option<Arc<dyn Refresher>>,
    /// Lazy single-document refresh
    pub documents: Option<Arc<dyn Refresher>>,
    /// Dirty marking after content mutations
    pub dirty: Option<Arc<dyn DirtyMarker>>,
}

impl IndexHooks {
    /// No capabilities: the index is a plain in-memory registry.
    pub fn none() -> Self {
        IndexHooks::default()
    }
}

impl fmt::Debug for IndexHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexHooks")
            .field("libraries", &self.libraries.is_some())
            .field("documents", &self.documents.is_some())
            .field("dirty", &self.dirty.is_some())
            .finish()
    }
}
