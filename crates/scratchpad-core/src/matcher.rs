//! Include/exclude matching for library scanning.
//!
//! A [`Matcher`] is compiled once per library from two pattern families (globs
//! and regular expressions), each split into include and exclude lists. All
//! patterns are tested against the path relative to the library root, always
//! prefixed with `/` (e.g. `/journal/2024-01-01.md`).
//!
//! ## Policy
//!
//! - Names starting with `.` are rejected outright (files and directories).
//! - Names ending in the snapshot suffix are rejected when snapshots are enabled.
//! - Any exclude glob or regex match rejects the path.
//! - Otherwise any include glob or regex match accepts it; when no include
//!   pattern of either kind was configured, everything is accepted.

use crate::error::{IndexError, Result};
use glob::Pattern;
use regex::Regex;

/// Compiled include/exclude rules for one library.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    include_globs: Vec<Pattern>,
    exclude_globs: Vec<Pattern>,
    include_regexes: Vec<Regex>,
    exclude_regexes: Vec<Regex>,
    snapshot_suffix: Option<String>,
}

impl Matcher {
    /// Compile all patterns, failing on the first one that does not compile.
    pub fn compile(
        include_globs: &[String],
        exclude_globs: &[String],
        include_regexes: &[String],
        exclude_regexes: &[String],
    ) -> Result<Self> {
        Ok(Matcher {
            include_globs: compile_globs(include_globs)?,
            exclude_globs: compile_globs(exclude_globs)?,
            include_regexes: compile_regexes(include_regexes)?,
            exclude_regexes: compile_regexes(exclude_regexes)?,
            snapshot_suffix: None,
        })
    }

    /// Skip files whose name ends with `.{extension}`.
    pub fn with_snapshot_extension(mut self, extension: &str) -> Self {
        self.snapshot_suffix = if extension.is_empty() {
            None
        } else {
            Some(format!(".{}", extension))
        };
        self
    }

    /// True when no include pattern of either kind was configured.
    pub fn includes_everything(&self) -> bool {
        self.include_globs.is_empty() && self.include_regexes.is_empty()
    }

    /// Check whether a regular file should be indexed.
    ///
    /// `name` is the file name, `relative` the `/`-prefixed path inside the library.
    pub fn accepts_file(&self, name: &str, relative: &str) -> bool {
        if is_hidden(name) {
            return false;
        }
        if let Some(ref suffix) = self.snapshot_suffix {
            if name.ends_with(suffix.as_str()) {
                return false;
            }
        }
        !self.is_excluded(relative) && self.is_included(relative)
    }

    /// Check whether a directory should be descended into.
    ///
    /// Include patterns are not applied to directories.
    pub fn accepts_directory(&self, name: &str, relative: &str) -> bool {
        !is_hidden(name) && !self.is_excluded(relative)
    }

    /// True if any exclude glob or exclude regex matches.
    pub fn is_excluded(&self, relative: &str) -> bool {
        self.exclude_globs.iter().any(|p| p.matches(relative))
            || self.exclude_regexes.iter().any(|r| r.is_match(relative))
    }

    /// True if any include pattern matches, or if there are none at all.
    pub fn is_included(&self, relative: &str) -> bool {
        self.includes_everything()
            || self.include_globs.iter().any(|p| p.matches(relative))
            || self.include_regexes.iter().any(|r| r.is_match(relative))
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>> {
    let mut compiled = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        for expanded in expand_braces(pattern) {
            let glob = Pattern::new(&expanded).map_err(|e| IndexError::InvalidGlob {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            compiled.push(glob);
        }
    }
    Ok(compiled)
}

fn compile_regexes(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| IndexError::InvalidRegex {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Expand `{a,b}` alternatives into separate patterns.
///
/// Nested groups are expanded recursively. A `{` without a matching `}` is
/// kept literally.
pub(crate) fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0usize;
    let mut close = None;
    let mut splits = Vec::new();
    for (i, ch) in pattern[open..].char_indices() {
        let at = open + i;
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(at);
                    break;
                }
            }
            ',' if depth == 1 => splits.push(at),
            _ => {}
        }
    }

    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut bounds = Vec::with_capacity(splits.len() + 2);
    bounds.push(open);
    bounds.extend(splits);
    bounds.push(close);

    let mut expanded = Vec::new();
    for window in bounds.windows(2) {
        let alternative = &pattern[window[0] + 1..window[1]];
        for tail in expand_braces(&format!("{}{}{}", prefix, alternative, suffix)) {
            expanded.push(tail);
        }
    }
    expanded
}
