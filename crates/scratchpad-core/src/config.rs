//! Configuration management for Scratchpad.
//!
//! Configuration is a TOML file declaring the libraries to index and how the
//! index snapshot is handled. Unknown keys are rejected.
//!
//! ## Example Configuration File
//!
//! ```toml
//! [globals]
//! unique_identifier = "laptop-notes"
//!
//! [index]
//! database_enabled = true
//! database_path = "{CACHEDIR}/notes.db"
//!
//! [[library]]
//! identifier = "notes"
//! paths = ["/home/alice/notes"]
//! include_glob_patterns = ["**/*.{md,txt}"]
//! exclude_glob_patterns = ["**/drafts/**"]
//! use_file_extension_as_format = true
//! edit_enabled = true
//! ```

use crate::error::{IndexError, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory name used under the user's cache and config directories
pub const APPLICATION_NAME: &str = "z-scratchpad";

/// Main configuration structure for Scratchpad.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Process-wide settings
    pub globals: GlobalsConfig,

    /// Index snapshot settings
    pub index: IndexConfig,

    /// Library definitions
    #[serde(rename = "library")]
    pub libraries: Vec<LibraryConfig>,
}

/// Process-wide settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalsConfig {
    /// Overrides the derived configuration identity (and so the snapshot name)
    pub unique_identifier: Option<String>,

    /// Directory to change into before resolving library paths
    pub working_directory: Option<PathBuf>,
}

/// Index snapshot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Use an on-disk snapshot at all
    pub database_enabled: bool,

    /// Snapshot location; `{CACHEDIR}` and `{TMPDIR}` prefixes are expanded
    pub database_path: Option<String>,

    /// Allow callers to trigger a full re-validation of all libraries
    pub libraries_refresh_enabled: bool,

    /// Allow callers to refresh single documents before using them
    pub documents_refresh_enabled: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            database_enabled: true,
            database_path: None,
            libraries_refresh_enabled: true,
            documents_refresh_enabled: true,
        }
    }
}

/// A library as written in the configuration file.
///
/// This is validated and normalized into a [`crate::Library`] once per run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibraryConfig {
    pub identifier: String,
    pub name: String,
    pub paths: Vec<PathBuf>,
    pub disabled: bool,

    pub edit_enabled: bool,

    pub create_enabled: bool,
    pub create_path: Option<PathBuf>,
    pub create_extension: Option<String>,

    pub snapshot_enabled: bool,
    pub snapshot_extension: Option<String>,

    pub include_glob_patterns: Vec<String>,
    pub exclude_glob_patterns: Vec<String>,
    pub include_regex_patterns: Vec<String>,
    pub exclude_regex_patterns: Vec<String>,

    pub use_file_name_as_identifier: bool,
    pub use_path_in_library_as_identifier: bool,
    pub use_file_extension_as_format: bool,
}

impl LibraryConfig {
    /// The ad-hoc library used for `--library-path` or an empty configuration file.
    pub fn for_paths(paths: Vec<PathBuf>) -> Self {
        let create_path = paths.first().cloned();
        LibraryConfig {
            identifier: "library".to_string(),
            name: "Library".to_string(),
            paths,
            edit_enabled: true,
            create_enabled: true,
            create_path,
            include_glob_patterns: vec!["**/*.{md,markdown,gmi,gemini,txt,text}".to_string()],
            use_path_in_library_as_identifier: true,
            use_file_extension_as_format: true,
            ..Default::default()
        }
    }
}

/// A configuration file together with where it was found.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    /// Absolute, symlink-resolved path of the file (None when built in memory)
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// An empty file found in the working directory stands for "index this
    /// directory" and yields the ad-hoc library rooted there.
    pub fn load_from(path: &Path, in_working_directory: bool) -> Result<LoadedConfig> {
        let absolute = absolute_path(path)?;
        let canonical =
            fs::canonicalize(&absolute).map_err(|e| IndexError::io("resolve configuration", &absolute, e))?;

        info!(path = %canonical.display(), "Loading configuration");
        let contents = fs::read_to_string(&canonical)
            .map_err(|e| IndexError::io("read configuration", &canonical, e))?;

        let config = if contents.trim().is_empty() {
            let mut config = Config::default();
            if in_working_directory {
                if let Some(parent) = canonical.parent() {
                    config.libraries = vec![LibraryConfig::for_paths(vec![parent.to_path_buf()])];
                }
            }
            config
        } else {
            toml::from_str(&contents)
                .map_err(|e| IndexError::config(format!("failed to parse {}: {}", canonical.display(), e)))?
        };

        Ok(LoadedConfig {
            config,
            path: Some(canonical),
        })
    }

    /// Find the first existing configuration file among the well-known locations.
    ///
    /// Returns the path and whether it was found in the working directory.
    pub fn discover() -> Result<Option<(PathBuf, bool)>> {
        let mut candidates: Vec<(PathBuf, bool)> = Vec::new();
        for name in [".scratchpad", ".scratchpad.toml", ".z-scratchpad", ".z-scratchpad.toml", "default.toml"] {
            candidates.push((PathBuf::from(".").join(name), true));
        }
        if let Some(base) = BaseDirs::new() {
            let home = base.home_dir();
            candidates.push((home.join(".scratchpad"), false));
            candidates.push((home.join(".scratchpad.toml"), false));
            candidates.push((home.join(".scratchpad").join("default.toml"), false));
            candidates.push((home.join(".z-scratchpad"), false));
            candidates.push((home.join(".z-scratchpad.toml"), false));
            candidates.push((home.join(".z-scratchpad").join("default.toml"), false));
            candidates.push((base.config_dir().join(APPLICATION_NAME).join("default.toml"), false));
        }

        for (candidate, in_working_directory) in candidates {
            match fs::metadata(&candidate) {
                Ok(meta) if meta.is_file() => {
                    debug!(path = %candidate.display(), "Found configuration file");
                    return Ok(Some((candidate, in_working_directory)));
                }
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(IndexError::io("stat configuration", &candidate, e)),
            }
        }
        Ok(None)
    }

    /// Libraries that are not marked `disabled`.
    pub fn enabled_libraries(&self) -> Vec<LibraryConfig> {
        self.libraries.iter().filter(|l| !l.disabled).cloned().collect()
    }
}

/// Identity of a configuration, used to name its snapshot file.
///
/// The explicit `unique_identifier` wins; otherwise the SHA-256 of the host
/// name and the configuration path.
pub fn configuration_identity(config: &LoadedConfig) -> Option<String> {
    if let Some(ref id) = config.config.globals.unique_identifier {
        if !id.is_empty() {
            return Some(id.clone());
        }
    }
    let path = config.path.as_ref()?;
    Some(fingerprint(&format!("{}\0{}", host_name(), path.display())))
}

fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// The node name as reported by the system, regardless of the environment.
#[cfg(unix)]
fn host_name() -> String {
    let mut buffer = [0u8; 256];
    let status = unsafe { libc::gethostname(buffer.as_mut_ptr().cast(), buffer.len()) };
    if status != 0 {
        return "localhost".to_string();
    }
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    let name = String::from_utf8_lossy(&buffer[..end]).trim().to_string();
    if name.is_empty() {
        "localhost".to_string()
    } else {
        name
    }
}

#[cfg(not(unix))]
fn host_name() -> String {
    std::env::var("COMPUTERNAME")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Resolve the snapshot path from the index settings and configuration identity.
///
/// Returns `None` when the snapshot is disabled or no location can be derived.
pub fn resolve_database_path(index: &IndexConfig, identity: Option<&str>) -> Result<Option<PathBuf>> {
    if !index.database_enabled {
        return Ok(None);
    }
    let template = match (&index.database_path, identity) {
        (Some(path), _) if !path.is_empty() => path.clone(),
        (_, Some(identity)) => format!("{{CACHEDIR}}/{}.db", identity),
        _ => return Ok(None),
    };

    if let Some(rest) = template.strip_prefix("{CACHEDIR}") {
        let cache_dir = default_cache_dir()?;
        fs::create_dir_all(&cache_dir).map_err(|e| IndexError::io("create cache directory", &cache_dir, e))?;
        return Ok(Some(cache_dir.join(rest.trim_start_matches('/'))));
    }
    if let Some(rest) = template.strip_prefix("{TMPDIR}") {
        return Ok(Some(std::env::temp_dir().join(rest.trim_start_matches('/'))));
    }
    Ok(Some(PathBuf::from(template)))
}

/// The per-user cache directory for snapshots.
pub fn default_cache_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", APPLICATION_NAME)
        .ok_or_else(|| IndexError::config("could not determine cache directory"))?;
    Ok(dirs.cache_dir().to_path_buf())
}

/// Make a path absolute against the current working directory.
pub(crate) fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| IndexError::io("get working directory", path, e))?;
    Ok(cwd.join(path))
}
