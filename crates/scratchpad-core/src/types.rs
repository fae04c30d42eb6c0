//! Identifier types for Scratchpad.
//!
//! Libraries are named by a short token (`notes`, `work-log`), documents by
//! `library:token` where the token is derived from the file's name or its path
//! inside the library. Both are validated on construction, so a value of these
//! types is always well formed.

use crate::error::{IndexError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

const LIBRARY_TOKEN: &str = r"[a-z0-9]+(?:[_-]+[a-z0-9]+)*";
const DOCUMENT_SEGMENT: &str = r"[a-z0-9]+(?:[._-]+[a-z0-9]+)*";

fn library_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(&format!("^{}$", LIBRARY_TOKEN)).expect("library identifier grammar compiles")
    })
}

fn document_token_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(&format!("^{0}(?:/{0})*$", DOCUMENT_SEGMENT))
            .expect("document token grammar compiles")
    })
}

/// Identifier of a library, e.g. `notes`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LibraryId(String);

impl LibraryId {
    /// Validate and wrap a library identifier.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if library_regex().is_match(&id) {
            Ok(LibraryId(id))
        } else {
            Err(IndexError::InvalidLibraryIdentifier { identifier: id })
        }
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LibraryId {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        LibraryId::new(s)
    }
}

/// Identifier of a document: `library:token`.
///
/// `DocumentId::parse(&id.to_string())` always yields `id` back.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId {
    library: LibraryId,
    token: String,
}

impl DocumentId {
    /// Compose an identifier from a library and an already derived token.
    pub fn new(library: LibraryId, token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if !document_token_regex().is_match(&token) {
            return Err(IndexError::InvalidDocumentIdentifier {
                identifier: format!("{}:{}", library, token),
            });
        }
        Ok(DocumentId { library, token })
    }

    /// Compose an identifier from separate library and token strings.
    pub fn format(library: &str, token: &str) -> Result<Self> {
        DocumentId::new(LibraryId::new(library)?, token)
    }

    /// Parse `library:token`.
    pub fn parse(identifier: &str) -> Result<Self> {
        let invalid = || IndexError::InvalidDocumentIdentifier {
            identifier: identifier.to_string(),
        };
        let (library, token) = identifier.split_once(':').ok_or_else(invalid)?;
        let library = LibraryId::new(library).map_err(|_| invalid())?;
        DocumentId::new(library, token)
    }

    /// The library part
    pub fn library(&self) -> &LibraryId {
        &self.library
    }

    /// The path-derived token part
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.library, self.token)
    }
}

impl FromStr for DocumentId {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        DocumentId::parse(s)
    }
}

/// Build a document token out of path components (directories and file stem).
///
/// Each component is lowercased; characters outside `[a-z0-9._-]` turn into
/// `-`, separator runs collapse to their first character and are trimmed from
/// both ends. Components that end up empty are dropped. The result is empty
/// when nothing usable remains.
pub fn token_from_components<'a>(components: impl IntoIterator<Item = &'a str>) -> String {
    let parts: Vec<String> = components
        .into_iter()
        .map(normalize_component)
        .filter(|part| !part.is_empty())
        .collect();
    parts.join("/")
}

fn normalize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending: Option<char> = None;
    for ch in raw.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if let Some(separator) = pending.take() {
                if !out.is_empty() {
                    out.push(separator);
                }
            }
            out.push(ch);
        } else if pending.is_none() {
            pending = Some(if matches!(ch, '.' | '_' | '-') { ch } else { '-' });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_id() {
        assert!(LibraryId::new("notes").is_ok());
        assert!(LibraryId::new("work_log-2").is_ok());
        assert!(LibraryId::new("").is_err());
        assert!(LibraryId::new("Notes").is_err());
        assert!(LibraryId::new("-notes").is_err());
        assert!(LibraryId::new("notes-").is_err());
        assert!(LibraryId::new("my notes").is_err());
    }

    #[test]
    fn test_document_id_round_trip() {
        for (library, token) in [("notes", "intro"), ("lib1", "a/b.c/d-e"), ("x_y", "2024")] {
            let id = DocumentId::format(library, token).unwrap();
            let parsed = DocumentId::parse(&id.to_string()).unwrap();
            assert_eq!(parsed, id);
            assert_eq!(parsed.library().as_str(), library);
            assert_eq!(parsed.token(), token);
        }
    }

    #[test]
    fn test_document_id_rejects() {
        assert!(DocumentId::parse("intro").is_err());
        assert!(DocumentId::parse("notes:").is_err());
        assert!(DocumentId::parse(":intro").is_err());
        assert!(DocumentId::parse("notes:a//b").is_err());
        assert!(DocumentId::parse("notes:Intro").is_err());
        assert!(DocumentId::parse("notes:a:b").is_err());
    }

    #[test]
    fn test_token_from_components() {
        assert_eq!(token_from_components(["Intro"]), "intro");
        assert_eq!(token_from_components(["My Notes", "Daily  Log"]), "my-notes/daily-log");
        assert_eq!(token_from_components(["v1.2_final"]), "v1.2_final");
        assert_eq!(token_from_components(["--x--", "!!!"]), "x");
        assert_eq!(token_from_components(["???"]), "");
    }

    #[test]
    fn test_derived_tokens_parse() {
        let token = token_from_components(["Projects", "Q3 Plan (draft)"]);
        assert_eq!(token, "projects/q3-plan-draft");
        assert!(DocumentId::format("work", &token).is_ok());
    }
}
