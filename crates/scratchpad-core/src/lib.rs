//! # Scratchpad Core Library
//!
//! This crate indexes notes kept as plain files in one or more directories
//! ("libraries") and keeps that index fresh across process runs through an
//! on-disk snapshot and a dirty-marker file.
//!
//! ## Architecture
//!
//! - **Config** (`config`): TOML configuration, discovery and snapshot location
//! - **Library** (`library`): validated library definitions
//! - **Matcher** (`matcher`): include/exclude glob and regex rules
//! - **Walker** (`walker`): breadth-first directory traversal
//! - **Document** (`document`): identifier, format and title derivation
//! - **Index** (`index`): in-memory registry of libraries and documents
//! - **Persistence** (`persistence`): snapshot file and dirty marker
//! - **Coordinator** (`coordinator`): load-or-walk decision and refresh hooks
//!
//! ## Example
//!
//! ```rust,ignore
//! use scratchpad_core::{initialize_libraries, Config, Coordinator, IndexOptions};
//!
//! let loaded = Config::load_from(path, false)?;
//! let libraries = initialize_libraries(&loaded.config.libraries)?;
//! let (index, _coordinator) = Coordinator::open(libraries, IndexOptions::default())?;
//!
//! for document in index.select_all() {
//!     println!("{}  {}", document.id, document.label());
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod document;
pub mod error;
pub mod hooks;
pub mod index;
pub mod library;
pub mod matcher;
pub mod persistence;
pub mod types;
pub mod walker;

// Re-export commonly used types
pub use config::{Config, LoadedConfig};
pub use coordinator::{Coordinator, IndexOptions, SyncOutcome};
pub use document::{Document, DocumentFormat};
pub use error::{IndexError, Result};
pub use hooks::{DirtyMarker, IndexHooks, Refresher};
pub use index::{Index, IndexStats};
pub use library::{initialize_libraries, Library};
pub use matcher::Matcher;
pub use persistence::{SnapshotLoad, SnapshotStore};
pub use types::{DocumentId, LibraryId};
