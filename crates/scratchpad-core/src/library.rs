//! Initialized libraries.
//!
//! A [`Library`] is built from a [`LibraryConfig`] exactly once per run: paths
//! are made absolute and checked to be directories, defaults are filled in,
//! extensions lose their leading dots and the patterns are compiled into a
//! [`Matcher`]. The result is immutable.

use crate::config::{absolute_path, LibraryConfig};
use crate::error::{IndexError, Result};
use crate::matcher::Matcher;
use crate::types::LibraryId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default extension for documents created in a library
pub const DEFAULT_CREATE_EXTENSION: &str = "txt";

/// Default extension marking generated snapshot companions
pub const DEFAULT_SNAPSHOT_EXTENSION: &str = "snapshot";

/// Where a document's identifier token comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentifierSource {
    /// The file name without its extension
    FileName,
    /// The path inside the library, without the extension
    PathInLibrary,
}

/// Include/exclude patterns as configured (kept for comparison and display).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryPatterns {
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub include_regexes: Vec<String>,
    pub exclude_regexes: Vec<String>,
}

/// Settings for creating new documents in a library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSettings {
    pub path: PathBuf,
    pub extension: String,
}

/// A validated library.
#[derive(Debug, Clone)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    pub paths: Vec<PathBuf>,
    pub edit_enabled: bool,
    pub create: Option<CreateSettings>,
    pub snapshot_extension: Option<String>,
    pub patterns: LibraryPatterns,
    pub identifier_source: IdentifierSource,
    pub use_file_extension_as_format: bool,
    matcher: Matcher,
}

impl Library {
    /// Validate and normalize a configured library.
    pub fn initialize(config: &LibraryConfig) -> Result<Self> {
        if config.identifier.is_empty() {
            return Err(IndexError::library("", "missing identifier"));
        }
        let id = LibraryId::new(config.identifier.as_str())?;
        let fail = |reason: &str| IndexError::library(id.as_str(), reason);

        if config.paths.is_empty() {
            return Err(fail("no paths configured"));
        }
        let mut paths = Vec::with_capacity(config.paths.len());
        for path in &config.paths {
            if path.as_os_str().is_empty() {
                return Err(fail("empty path"));
            }
            paths.push(existing_directory(path, id.as_str())?);
        }

        let create = if config.create_enabled {
            let path = match config.create_path {
                Some(ref path) => existing_directory(path, id.as_str())?,
                None if paths.len() == 1 => paths[0].clone(),
                None => return Err(fail("create path required when the library has several paths")),
            };
            let extension = normalize_extension(
                config.create_extension.as_deref().unwrap_or(DEFAULT_CREATE_EXTENSION),
            );
            if extension.is_empty() {
                return Err(fail("empty create extension"));
            }
            Some(CreateSettings { path, extension })
        } else {
            if config.create_path.is_some() {
                return Err(fail("create path set while creation is disabled"));
            }
            if config.create_extension.is_some() {
                return Err(fail("create extension set while creation is disabled"));
            }
            None
        };

        let snapshot_extension = if config.snapshot_enabled {
            let extension = normalize_extension(
                config.snapshot_extension.as_deref().unwrap_or(DEFAULT_SNAPSHOT_EXTENSION),
            );
            if extension.is_empty() {
                return Err(fail("empty snapshot extension"));
            }
            Some(extension)
        } else {
            if config.snapshot_extension.is_some() {
                return Err(fail("snapshot extension set while snapshots are disabled"));
            }
            None
        };

        let identifier_source = match (
            config.use_file_name_as_identifier,
            config.use_path_in_library_as_identifier,
        ) {
            (true, true) => {
                return Err(fail("file name and path cannot both be used as identifier"));
            }
            (true, false) => IdentifierSource::FileName,
            _ => IdentifierSource::PathInLibrary,
        };

        let patterns = LibraryPatterns {
            include_globs: config.include_glob_patterns.clone(),
            exclude_globs: config.exclude_glob_patterns.clone(),
            include_regexes: config.include_regex_patterns.clone(),
            exclude_regexes: config.exclude_regex_patterns.clone(),
        };
        let mut matcher = Matcher::compile(
            &patterns.include_globs,
            &patterns.exclude_globs,
            &patterns.include_regexes,
            &patterns.exclude_regexes,
        )?;
        if let Some(ref extension) = snapshot_extension {
            matcher = matcher.with_snapshot_extension(extension);
        }

        let name = if config.name.is_empty() {
            id.as_str().to_string()
        } else {
            config.name.clone()
        };

        debug!(library = %id, paths = paths.len(), "Library initialized");

        Ok(Library {
            id,
            name,
            paths,
            edit_enabled: config.edit_enabled,
            create,
            snapshot_extension,
            patterns,
            identifier_source,
            use_file_extension_as_format: config.use_file_extension_as_format,
            matcher,
        })
    }

    /// The compiled include/exclude rules
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Whether new documents may be created in this library
    pub fn create_enabled(&self) -> bool {
        self.create.is_some()
    }
}

/// Initialize every enabled library, rejecting duplicate identifiers.
pub fn initialize_libraries(configs: &[LibraryConfig]) -> Result<Vec<Library>> {
    let mut libraries: Vec<Library> = Vec::with_capacity(configs.len());
    for config in configs.iter().filter(|c| !c.disabled) {
        let library = Library::initialize(config)?;
        if libraries.iter().any(|l| l.id == library.id) {
            return Err(IndexError::library(library.id.as_str(), "duplicate library identifier"));
        }
        libraries.push(library);
    }
    Ok(libraries)
}

fn existing_directory(path: &Path, library: &str) -> Result<PathBuf> {
    let path = absolute_path(path)?;
    let meta = fs::metadata(&path).map_err(|e| IndexError::io("stat library path", &path, e))?;
    if !meta.is_dir() {
        return Err(IndexError::library(
            library,
            format!("`{}` is not a directory", path.display()),
        ));
    }
    Ok(path)
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_string()
}
