//! Persistence layer for the Scratchpad index.
//!
//! This module saves the index to a snapshot file and restores it, and manages
//! the companion dirty marker. The on-disk format is designed for:
//!
//! - Fast loading: binary format with optional compression
//! - Versioning: format changes are detected and reported, not treated as errors
//! - Atomic writes: a crash never leaves a half-written snapshot in place
//! - Integrity: a checksum detects corruption
//!
//! ## Snapshot File Format
//!
//! ```text
//! [Header: 32 bytes]
//!   - Magic: "ZSPD" (4 bytes)
//!   - Version: u32 (4 bytes)
//!   - Flags: u32 (4 bytes) - compression
//!   - Document count: u64 (8 bytes)
//!   - Reserved: 12 bytes
//!
//! [Payload: variable]
//!   - bincode of { refreshed_at, libraries, documents }, LZ4 compressed
//!
//! [Footer: 8 bytes]
//!   - CRC32 checksum of the payload: u32
//!   - Magic: "DPSZ" (4 bytes)
//! ```
//!
//! ## Dirty marker
//!
//! A sibling file named like the snapshot plus `-dirty`. Only its modification
//! time matters: when newer than the snapshot's, the snapshot is stale.

use crate::document::Document;
use crate::error::{IndexError, Result};
use crate::index::Index;
use crate::library::{IdentifierSource, Library, LibraryPatterns};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

/// Magic bytes at the start of snapshot files
pub const MAGIC_HEADER: &[u8; 4] = b"ZSPD";
/// Magic bytes at the end of snapshot files (reversed)
pub const MAGIC_FOOTER: &[u8; 4] = b"DPSZ";
/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;
/// Suffix appended to the snapshot path to name the dirty marker
pub const DIRTY_SUFFIX: &str = "-dirty";

const HEADER_LEN: usize = 32;
const FOOTER_LEN: usize = 8;

/// Flags for the snapshot file format
#[derive(Debug, Clone, Copy)]
struct SnapshotFlags(u32);

impl SnapshotFlags {
    const NONE: Self = SnapshotFlags(0);
    const COMPRESSED_LZ4: Self = SnapshotFlags(1);

    fn is_compressed(&self) -> bool {
        self.0 & 1 != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotHeader {
    magic: [u8; 4],
    version: u32,
    flags: u32,
    document_count: u64,
    reserved: [u8; 12],
}

impl SnapshotHeader {
    fn new(document_count: u64, flags: SnapshotFlags) -> Self {
        SnapshotHeader {
            magic: *MAGIC_HEADER,
            version: SNAPSHOT_VERSION,
            flags: flags.0,
            document_count,
            reserved: [0; 12],
        }
    }
}

/// Library settings as stored in a snapshot.
///
/// Compared against the running configuration on load: any difference means
/// the snapshot was built from other settings and cannot be trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLibrary {
    pub identifier: String,
    pub paths: Vec<PathBuf>,
    pub edit_enabled: bool,
    pub snapshot_extension: Option<String>,
    pub patterns: LibraryPatterns,
    pub identifier_source: IdentifierSource,
    pub use_file_extension_as_format: bool,
}

impl From<&Library> for StoredLibrary {
    fn from(library: &Library) -> Self {
        StoredLibrary {
            identifier: library.id.as_str().to_string(),
            paths: library.paths.clone(),
            edit_enabled: library.edit_enabled,
            snapshot_extension: library.snapshot_extension.clone(),
            patterns: library.patterns.clone(),
            identifier_source: library.identifier_source,
            use_file_extension_as_format: library.use_file_extension_as_format,
        }
    }
}

/// Contents of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub refreshed_at: Option<DateTime<Utc>>,
    pub libraries: Vec<StoredLibrary>,
    pub documents: Vec<Document>,
}

impl Snapshot {
    /// Capture the current contents of an index.
    pub fn capture(index: &Index) -> Self {
        Snapshot {
            refreshed_at: index.refresh_timestamp(),
            libraries: index
                .libraries()
                .iter()
                .map(|l| StoredLibrary::from(l.as_ref()))
                .collect(),
            documents: index.select_all().iter().map(|d| d.as_ref().clone()).collect(),
        }
    }

    /// Whether this snapshot was built from exactly these libraries.
    pub fn matches_libraries(&self, libraries: &[Library]) -> bool {
        let mut current: Vec<StoredLibrary> = libraries.iter().map(StoredLibrary::from).collect();
        let mut stored = self.libraries.clone();
        current.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        stored.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        current == stored
    }
}

/// Outcome of reading a snapshot file.
#[derive(Debug)]
pub enum SnapshotLoad {
    Loaded(Snapshot),
    /// Written by another format version; the caller should walk instead
    Incompatible { found: u32, expected: u32 },
}

/// Manages the snapshot file and its dirty marker.
///
/// ## Example
///
/// ```rust,ignore
/// use scratchpad_core::SnapshotStore;
///
/// let store = SnapshotStore::new("/home/me/.cache/z-scratchpad/abc.db");
/// store.save(&index)?;
/// if let SnapshotLoad::Loaded(snapshot) = store.load()? {
///     println!("{} documents", snapshot.documents.len());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    use_compression: bool,
}

impl SnapshotStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        SnapshotStore {
            path: path.as_ref().to_path_buf(),
            use_compression: true,
        }
    }

    /// Set whether to use compression when saving.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.use_compression = compress;
        self
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the dirty marker.
    pub fn dirty_path(&self) -> PathBuf {
        with_suffix(&self.path, DIRTY_SUFFIX)
    }

    /// Check if a snapshot file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Modification time of the snapshot, `None` if absent.
    pub fn modified(&self) -> Result<Option<DateTime<Utc>>> {
        modified_time(&self.path, "stat snapshot")
    }

    /// Modification time of the dirty marker, `None` if absent.
    pub fn dirty_modified(&self) -> Result<Option<DateTime<Utc>>> {
        modified_time(&self.dirty_path(), "stat dirty marker")
    }

    /// Set the dirty marker's modification time to now, creating it if needed.
    pub fn touch_dirty(&self) -> Result<DateTime<Utc>> {
        let path = self.dirty_path();
        let now = SystemTime::now();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| IndexError::io("create dirty marker", &path, e))?;
        file.set_modified(now)
            .map_err(|e| IndexError::io("touch dirty marker", &path, e))?;
        debug!(path = %path.display(), "Dirty marker touched");
        Ok(DateTime::<Utc>::from(now))
    }

    /// Save the index contents.
    ///
    /// Uses atomic write (write to temp, then rename) to prevent corruption.
    pub fn save(&self, index: &Index) -> Result<()> {
        self.save_snapshot(&Snapshot::capture(index))
    }

    pub fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| IndexError::io("create snapshot directory", parent, e))?;
            }
        }

        let document_count = snapshot.documents.len() as u64;
        info!(
            path = %self.path.display(),
            documents = document_count,
            "Saving index snapshot"
        );

        let bytes = bincode::serialize(snapshot)?;
        let (flags, payload) = if self.use_compression {
            (SnapshotFlags::COMPRESSED_LZ4, lz4_flex::compress_prepend_size(&bytes))
        } else {
            (SnapshotFlags::NONE, bytes)
        };
        let header_bytes = bincode::serialize(&SnapshotHeader::new(document_count, flags))?;
        let checksum = crc32fast::hash(&payload);

        // Each writer stages into its own file; concurrent saves race on the
        // rename only, and the last one wins.
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = tempfile::Builder::new()
            .prefix(".scratchpad-")
            .suffix(".tmp")
            .tempfile_in(directory)
            .map_err(|e| IndexError::io("create snapshot", directory, e))?;
        {
            let staged_path = staged.path().to_path_buf();
            let mut writer = BufWriter::new(staged.as_file_mut());
            let mut write = |bytes: &[u8]| {
                writer
                    .write_all(bytes)
                    .map_err(|e| IndexError::io("write snapshot", &staged_path, e))
            };
            write(&header_bytes)?;
            write(&payload)?;
            write(&checksum.to_le_bytes())?;
            write(MAGIC_FOOTER)?;
            writer
                .flush()
                .map_err(|e| IndexError::io("write snapshot", &staged_path, e))?;
        }

        staged
            .persist(&self.path)
            .map_err(|e| IndexError::io("replace snapshot", &self.path, e.error))?;

        debug!(compressed = self.use_compression, "Snapshot saved");
        Ok(())
    }

    /// Read the snapshot file.
    ///
    /// A missing file is an I/O error; callers check [`SnapshotStore::modified`]
    /// first. Damage is reported as [`IndexError::SnapshotCorrupted`].
    pub fn load(&self) -> Result<SnapshotLoad> {
        info!(path = %self.path.display(), "Loading index snapshot");
        let data = fs::read(&self.path).map_err(|e| IndexError::io("read snapshot", &self.path, e))?;

        if data.len() < HEADER_LEN + FOOTER_LEN {
            return Err(corrupted("file too short"));
        }
        let header: SnapshotHeader = bincode::deserialize(&data[..HEADER_LEN])
            .map_err(|e| corrupted(format!("unreadable header: {}", e)))?;
        if header.magic != *MAGIC_HEADER {
            return Err(corrupted("invalid magic bytes in header"));
        }
        if header.version != SNAPSHOT_VERSION {
            return Ok(SnapshotLoad::Incompatible {
                found: header.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let (payload, footer) = data[HEADER_LEN..].split_at(data.len() - HEADER_LEN - FOOTER_LEN);
        if &footer[4..8] != MAGIC_FOOTER {
            return Err(corrupted("invalid footer magic bytes"));
        }
        let stored_checksum = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
        let computed_checksum = crc32fast::hash(payload);
        if stored_checksum != computed_checksum {
            return Err(corrupted(format!(
                "checksum mismatch: expected {:08x}, got {:08x}",
                stored_checksum, computed_checksum
            )));
        }

        let bytes = if SnapshotFlags(header.flags).is_compressed() {
            lz4_flex::decompress_size_prepended(payload)
                .map_err(|e| corrupted(format!("decompression failed: {}", e)))?
        } else {
            payload.to_vec()
        };
        let snapshot: Snapshot = bincode::deserialize(&bytes)
            .map_err(|e| corrupted(format!("deserialization failed: {}", e)))?;
        if snapshot.documents.len() as u64 != header.document_count {
            return Err(corrupted("document count does not match header"));
        }

        info!(documents = snapshot.documents.len(), "Snapshot loaded");
        Ok(SnapshotLoad::Loaded(snapshot))
    }

    /// Delete the snapshot and its dirty marker.
    ///
    /// Returns whether anything was removed.
    pub fn clear(&self) -> Result<bool> {
        let mut removed = false;
        for path in [self.path.clone(), self.dirty_path()] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(IndexError::io("remove snapshot", &path, e)),
            }
        }
        Ok(removed)
    }
}

fn corrupted(reason: impl Into<String>) -> IndexError {
    IndexError::SnapshotCorrupted {
        reason: reason.into(),
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn modified_time(path: &Path, operation: &'static str) -> Result<Option<DateTime<Utc>>> {
    match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(time) => Ok(Some(DateTime::<Utc>::from(time))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(IndexError::io(operation, path, e)),
    }
}
