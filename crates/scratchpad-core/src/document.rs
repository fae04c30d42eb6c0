//! Documents and their derivation from files.
//!
//! Loading a document reads the file and then derives, strictly in this
//! order, its identifier, its format and its titles. Each step sees the
//! results of the previous ones; any failure aborts the load.
//!
//! ## Metadata header
//!
//! A file may start with metadata lines of the form `:: key: value`. Known
//! keys are `title` (repeatable; the first is the title, the rest are
//! alternative titles) and `format`. The header ends at the first line that
//! does not start with `::`.

use crate::error::{IndexError, Result};
use crate::library::{IdentifierSource, Library};
use crate::types::{token_from_components, DocumentId, LibraryId};
use crate::walker::Candidate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const METADATA_PREFIX: &str = "::";

/// Rendering format of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentFormat {
    Text,
    Commonmark,
    Gemtext,
}

impl DocumentFormat {
    /// Format for a file extension (case-insensitive).
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(DocumentFormat::Text),
            "md" | "markdown" => Some(DocumentFormat::Commonmark),
            "gmi" | "gemini" => Some(DocumentFormat::Gemtext),
            _ => None,
        }
    }

    /// Format for an explicit name as written in a metadata header.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "text" => Some(DocumentFormat::Text),
            "commonmark" | "markdown" => Some(DocumentFormat::Commonmark),
            "gemtext" | "gemini" => Some(DocumentFormat::Gemtext),
            _ => None,
        }
    }

    /// Whether `# ` lines are headings in this format
    fn has_headings(&self) -> bool {
        matches!(self, DocumentFormat::Commonmark | DocumentFormat::Gemtext)
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Text => write!(f, "text"),
            DocumentFormat::Commonmark => write!(f, "commonmark"),
            DocumentFormat::Gemtext => write!(f, "gemtext"),
        }
    }
}

/// One indexed note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Absolute path of the file
    pub path: PathBuf,
    /// Library root the file lives under
    pub root: PathBuf,
    pub format: DocumentFormat,
    /// Canonical title; may be empty
    pub title: String,
    pub title_alternatives: Vec<String>,
    /// Content lines, metadata header excluded
    pub body_lines: Vec<String>,
    pub edit_enabled: bool,
    /// File modification time when the document was loaded
    pub modified: Option<DateTime<Utc>>,
}

impl Document {
    /// The library this document belongs to
    pub fn library(&self) -> &LibraryId {
        self.id.library()
    }

    /// Title for display: the title, or `[identifier]` when it is empty.
    pub fn label(&self) -> String {
        if self.title.is_empty() {
            format!("[{}]", self.id)
        } else {
            self.title.clone()
        }
    }

    /// The text after the metadata header.
    pub fn body(&self) -> String {
        self.body_lines.join("\n")
    }
}

/// Raw file contents before derivation.
struct Source {
    path: PathBuf,
    root: PathBuf,
    metadata: Vec<(String, String)>,
    body_lines: Vec<String>,
    modified: Option<DateTime<Utc>>,
}

impl Source {
    fn read(root: &Path, path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| IndexError::io("read document", path, e))?;
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .ok();
        let text = String::from_utf8_lossy(&bytes);

        let mut metadata = Vec::new();
        let mut body_lines = Vec::new();
        let mut in_header = true;
        for line in text.lines() {
            if in_header {
                if let Some(rest) = line.strip_prefix(METADATA_PREFIX) {
                    let (key, value) = rest.split_once(':').ok_or_else(|| IndexError::InvalidMetadata {
                        path: path.to_path_buf(),
                        reason: format!("expected `key: value`, found `{}`", line),
                    })?;
                    metadata.push((key.trim().to_ascii_lowercase(), value.trim().to_string()));
                    continue;
                }
                in_header = false;
            }
            body_lines.push(line.to_string());
        }

        for (key, _) in &metadata {
            if key != "title" && key != "format" {
                return Err(IndexError::InvalidMetadata {
                    path: path.to_path_buf(),
                    reason: format!("unknown key `{}`", key),
                });
            }
        }

        Ok(Source {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
            metadata,
            body_lines,
            modified,
        })
    }

    fn metadata_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.metadata
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Load one accepted file as a document of `library`.
pub fn load_document(library: &Library, candidate: &Candidate) -> Result<Document> {
    let source = Source::read(&candidate.root, &candidate.path)?;
    let id = derive_identifier(&source, library)?;
    let format = derive_format(&source, library)?;
    let (title, title_alternatives) = derive_titles(&source, format);

    Ok(Document {
        id,
        path: source.path,
        root: source.root,
        format,
        title,
        title_alternatives,
        body_lines: source.body_lines,
        edit_enabled: library.edit_enabled,
        modified: source.modified,
    })
}

/// Load every candidate of a library; the first failure aborts the batch.
pub fn load_documents(library: &Library, candidates: &[Candidate]) -> Result<Vec<Document>> {
    candidates
        .iter()
        .map(|candidate| load_document(library, candidate))
        .collect()
}

fn derive_identifier(source: &Source, library: &Library) -> Result<DocumentId> {
    let relative = source.path.strip_prefix(&source.root).unwrap_or(&source.path);
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let token = match library.identifier_source {
        IdentifierSource::FileName => token_from_components([stem.as_str()]),
        IdentifierSource::PathInLibrary => {
            let parents: Vec<String> = relative
                .parent()
                .map(|p| {
                    p.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default();
            token_from_components(
                parents
                    .iter()
                    .map(String::as_str)
                    .chain(std::iter::once(stem.as_str())),
            )
        }
    };

    if token.is_empty() {
        return Err(IndexError::EmptyIdentifier {
            path: source.path.clone(),
        });
    }
    DocumentId::new(library.id.clone(), token)
}

fn derive_format(source: &Source, library: &Library) -> Result<DocumentFormat> {
    let unknown = |format: &str| IndexError::UnknownFormat {
        format: format.to_string(),
        path: source.path.clone(),
    };

    if library.use_file_extension_as_format {
        let extension = source
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        DocumentFormat::from_extension(&extension).ok_or_else(|| unknown(&extension))
    } else {
        let name = source.metadata_values("format").next().unwrap_or("");
        DocumentFormat::from_name(name).ok_or_else(|| unknown(name))
    }
}

fn derive_titles(source: &Source, format: DocumentFormat) -> (String, Vec<String>) {
    let mut titles: Vec<String> = source
        .metadata_values("title")
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    if format.has_headings() {
        titles.extend(source.body_lines.iter().filter_map(|line| heading(line)));
    } else if titles.is_empty() {
        if let Some(line) = source.body_lines.iter().map(|l| l.trim()).find(|l| !l.is_empty()) {
            titles.push(line.to_string());
        }
    }

    if titles.is_empty() {
        return (String::new(), Vec::new());
    }
    let title = titles.remove(0);
    (title, titles)
}

fn heading(line: &str) -> Option<String> {
    let rest = line.strip_prefix('#')?;
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let text = rest.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
