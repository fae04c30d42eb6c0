//! Error types for Scratchpad core operations.
//!
//! Every failure carries a stable code (see [`IndexError::code`]) and, where one
//! exists, the causing error. Library code returns these untouched up the call
//! chain; the binary reports them through `anyhow`.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using IndexError
pub type Result<T> = std::result::Result<T, IndexError>;

/// Core error types for Scratchpad operations.
#[derive(Error, Debug)]
pub enum IndexError {
    // === Configuration Errors ===
    /// A library identifier does not match the identifier grammar
    #[error("invalid library identifier `{identifier}`")]
    InvalidLibraryIdentifier { identifier: String },

    /// A document identifier is not of the form `library:token`
    #[error("invalid document identifier `{identifier}`")]
    InvalidDocumentIdentifier { identifier: String },

    /// A library definition failed validation
    #[error("invalid library `{library}`: {reason}")]
    InvalidLibrary { library: String, reason: String },

    /// Configuration file or switches are unusable
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    // === Pattern Errors ===
    /// An include or exclude glob failed to compile
    #[error("invalid glob pattern `{pattern}`: {reason}")]
    InvalidGlob { pattern: String, reason: String },

    /// An include or exclude regular expression failed to compile
    #[error("invalid regex pattern `{pattern}`: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    // === Walk Errors ===
    /// A directory entry that is neither a regular file nor a directory
    #[error("invalid entry `{path}`: not a regular file or directory")]
    InvalidEntry { path: PathBuf },

    // === Document Errors ===
    /// The document format could not be determined or is not supported
    #[error("unknown format `{format}` for document `{path}`")]
    UnknownFormat { format: String, path: PathBuf },

    /// Identifier derivation produced an empty token
    #[error("empty identifier derived for document `{path}`")]
    EmptyIdentifier { path: PathBuf },

    /// A metadata header line could not be understood
    #[error("invalid metadata in document `{path}`: {reason}")]
    InvalidMetadata { path: PathBuf, reason: String },

    // === Index Errors ===
    /// Two documents derived the same identifier
    #[error("duplicate document identifier `{identifier}`")]
    DuplicateDocument { identifier: String },

    /// A document refers to a library that is not registered
    #[error("document `{document}` refers to unknown library `{library}`")]
    UnknownLibrary { document: String, library: String },

    /// Lookup of a library by identifier failed
    #[error("library not found: {identifier}")]
    LibraryNotFound { identifier: String },

    /// Lookup of a document by identifier failed
    #[error("document not found: {identifier}")]
    DocumentNotFound { identifier: String },

    // === Snapshot Errors ===
    /// The snapshot file exists but is damaged
    #[error("snapshot is corrupted: {reason}")]
    SnapshotCorrupted { reason: String },

    /// Neither a snapshot load nor a walk produced the index contents
    #[error("no usable source of documents (walking disabled and snapshot unavailable)")]
    NoDocumentSource,

    // === I/O Errors ===
    /// An I/O operation failed
    #[error("{operation} failed for `{path}`: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// Serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl IndexError {
    /// Stable identifying code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            IndexError::InvalidLibraryIdentifier { .. } => "library-identifier-invalid",
            IndexError::InvalidDocumentIdentifier { .. } => "document-identifier-invalid",
            IndexError::InvalidLibrary { .. } => "library-invalid",
            IndexError::ConfigError { .. } => "configuration-invalid",
            IndexError::InvalidGlob { .. } => "pattern-glob-invalid",
            IndexError::InvalidRegex { .. } => "pattern-regex-invalid",
            IndexError::InvalidEntry { .. } => "walk-entry-invalid",
            IndexError::UnknownFormat { .. } => "document-format-unknown",
            IndexError::EmptyIdentifier { .. } => "document-identifier-empty",
            IndexError::InvalidMetadata { .. } => "document-metadata-invalid",
            IndexError::DuplicateDocument { .. } => "index-document-duplicate",
            IndexError::UnknownLibrary { .. } => "index-library-unknown",
            IndexError::LibraryNotFound { .. } => "library-not-found",
            IndexError::DocumentNotFound { .. } => "document-not-found",
            IndexError::SnapshotCorrupted { .. } => "snapshot-corrupted",
            IndexError::NoDocumentSource => "index-no-source",
            IndexError::Io { .. } => "io",
            IndexError::Serialization(_) => "serialization",
        }
    }

    /// Returns true for errors caused by configuration rather than file-system state
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            IndexError::InvalidLibraryIdentifier { .. }
                | IndexError::InvalidLibrary { .. }
                | IndexError::ConfigError { .. }
                | IndexError::InvalidGlob { .. }
                | IndexError::InvalidRegex { .. }
                | IndexError::NoDocumentSource
        )
    }

    /// Wrap an I/O error with the operation and path it happened on
    pub fn io(operation: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        IndexError::Io {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a library validation error
    pub fn library(library: impl Into<String>, reason: impl Into<String>) -> Self {
        IndexError::InvalidLibrary {
            library: library.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        IndexError::ConfigError {
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for IndexError {
    fn from(err: bincode::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}
