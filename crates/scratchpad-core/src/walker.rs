//! Library directory traversal.
//!
//! Directories are visited one level at a time: each directory's entries are
//! read, filtered through the library's [`Matcher`](crate::Matcher), and
//! accepted subdirectories are queued behind the ones already discovered. No
//! recursion is involved, so stack depth does not grow with the tree.
//!
//! Entries of each directory are sorted by name, which makes the output
//! deterministic for a given file-system state.

use crate::error::{IndexError, Result};
use crate::library::Library;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, instrument, trace};

/// A file accepted by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The library root the file was found under
    pub root: PathBuf,
    /// Absolute path of the file
    pub path: PathBuf,
}

impl Candidate {
    /// Path inside the library root, `/`-prefixed with `/` separators.
    pub fn relative_path(&self) -> String {
        relative_path(&self.root, &self.path)
    }
}

/// Walk every root of a library and return the accepted files in order.
#[instrument(skip(library), fields(library = %library.id))]
pub fn walk_library(library: &Library) -> Result<Vec<Candidate>> {
    let start = Instant::now();
    let mut candidates = Vec::new();
    for root in &library.paths {
        candidates.extend(walk_root(library, root)?);
    }
    info!(
        library = %library.id,
        documents = candidates.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Library walked"
    );
    Ok(candidates)
}

/// Walk several libraries; the result holds one list per library, in order.
///
/// Nothing is returned unless every library was walked successfully.
pub fn walk_libraries(libraries: &[Library]) -> Result<Vec<Vec<Candidate>>> {
    libraries.iter().map(walk_library).collect()
}

fn walk_root(library: &Library, root: &Path) -> Result<Vec<Candidate>> {
    let matcher = library.matcher();
    let mut candidates = Vec::with_capacity(1024);
    let mut folders: Vec<PathBuf> = Vec::with_capacity(128);
    folders.push(root.to_path_buf());

    let mut next = 0;
    while next < folders.len() {
        let folder = folders[next].clone();
        next += 1;

        let mut entries = fs::read_dir(&folder)
            .map_err(|e| IndexError::io("read directory", &folder, e))?
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| IndexError::io("read directory", &folder, e))?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            if name.starts_with('.') {
                trace!(path = %path.display(), "Skipping hidden entry");
                continue;
            }

            let meta = fs::metadata(&path).map_err(|e| IndexError::io("stat entry", &path, e))?;
            let relative = relative_path(root, &path);

            if meta.is_dir() {
                if matcher.accepts_directory(&name, &relative) {
                    folders.push(path);
                } else {
                    trace!(path = %relative, "Pruning excluded directory");
                }
            } else if meta.is_file() {
                if matcher.accepts_file(&name, &relative) {
                    trace!(path = %relative, "Accepting document");
                    candidates.push(Candidate {
                        root: root.to_path_buf(),
                        path,
                    });
                } else {
                    trace!(path = %relative, "Skipping unmatched file");
                }
            } else {
                return Err(IndexError::InvalidEntry { path });
            }
        }
    }

    Ok(candidates)
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut out = String::new();
    for component in relative.components() {
        out.push('/');
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}
