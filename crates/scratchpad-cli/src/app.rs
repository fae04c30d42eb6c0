//! Application state management.

use crate::{GlobalArgs, IndexSwitches};
use anyhow::Context;
use scratchpad_core::config::{configuration_identity, resolve_database_path, LibraryConfig};
use scratchpad_core::{
    initialize_libraries, Config, Coordinator, Index, IndexError, IndexOptions, Library,
    SnapshotStore, SyncOutcome,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Everything resolved from the command line and configuration file.
#[derive(Debug)]
pub struct Settings {
    /// Configuration file in use, if any
    pub config_path: Option<PathBuf>,
    /// Identity naming the snapshot file
    pub identity: Option<String>,
    pub libraries: Vec<Library>,
    pub options: IndexOptions,
}

impl Settings {
    /// Resolve configuration, libraries and index switches.
    pub fn resolve(args: &GlobalArgs) -> anyhow::Result<Self> {
        if let Some(ref dir) = args.chdir {
            change_directory(dir)?;
        }

        let loaded = match (&args.configuration, args.library_paths.is_empty()) {
            (Some(path), _) => Some(Config::load_from(path, false)?),
            (None, true) => match Config::discover()? {
                Some((path, in_working_directory)) => {
                    Some(Config::load_from(&path, in_working_directory)?)
                }
                None => None,
            },
            (None, false) => None,
        };
        let config = loaded
            .as_ref()
            .map(|l| l.config.clone())
            .unwrap_or_default();

        if let Some(ref dir) = config.globals.working_directory {
            change_directory(dir)?;
        }

        let library_configs = library_configs(&args.library_paths, &config)?;
        let libraries = initialize_libraries(&library_configs)?;

        let identity = match loaded {
            Some(ref loaded) => configuration_identity(loaded),
            None => config.globals.unique_identifier.clone(),
        };
        let database_path = resolve_database_path(&config.index, identity.as_deref())?;
        let options = index_options(&config, database_path, &args.index);

        debug!(
            libraries = libraries.len(),
            database = ?options.database_path,
            "Settings resolved"
        );

        Ok(Settings {
            config_path: loaded.and_then(|l| l.path),
            identity,
            libraries,
            options,
        })
    }

    /// The snapshot store, when the database is enabled.
    pub fn store(&self) -> Option<SnapshotStore> {
        self.options.database_path.as_ref().map(SnapshotStore::new)
    }
}

/// Shared application state.
pub struct App {
    pub settings: Settings,

    /// The document index
    pub index: Index,

    /// Owner of walking and snapshot handling
    pub coordinator: Arc<Coordinator>,

    /// What opening the index did
    pub outcome: SyncOutcome,
}

impl App {
    /// Build and synchronize the index.
    pub fn open(settings: Settings) -> anyhow::Result<Self> {
        Self::start(settings, false)
    }

    /// Build the index by walking every library, ignoring any snapshot.
    pub fn rebuild(settings: Settings) -> anyhow::Result<Self> {
        Self::start(settings, true)
    }

    fn start(settings: Settings, force: bool) -> anyhow::Result<Self> {
        let start = Instant::now();
        let coordinator = Arc::new(Coordinator::new(
            settings.libraries.clone(),
            settings.options.clone(),
        ));
        let index = Index::new(coordinator.hooks());
        let outcome = if force {
            coordinator.rebuild(&index)?;
            SyncOutcome::Walked
        } else {
            coordinator.synchronize(&index)?
        };

        info!(
            documents = index.len(),
            outcome = ?outcome,
            force,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Application initialized"
        );

        Ok(App {
            settings,
            index,
            coordinator,
            outcome,
        })
    }
}

fn change_directory(dir: &Path) -> anyhow::Result<()> {
    if dir.as_os_str().is_empty() {
        return Err(IndexError::config("empty working directory").into());
    }
    std::env::set_current_dir(dir)
        .with_context(|| format!("failed to change directory to {}", dir.display()))
}

/// Pick the library definitions to use.
///
/// Explicit paths and configured libraries are mutually exclusive, and at
/// least one library must remain.
pub fn library_configs(paths: &[PathBuf], config: &Config) -> anyhow::Result<Vec<LibraryConfig>> {
    if !paths.is_empty() && !config.libraries.is_empty() {
        return Err(IndexError::config(
            "--library-path cannot be combined with configured libraries",
        )
        .into());
    }
    let configs = if paths.is_empty() {
        config.enabled_libraries()
    } else {
        vec![LibraryConfig::for_paths(paths.to_vec())]
    };
    if configs.is_empty() {
        return Err(IndexError::config(
            "no libraries configured (use --library-path or a configuration file)",
        )
        .into());
    }
    Ok(configs)
}

/// Combine the `[index]` section with the command-line switches.
pub fn index_options(
    config: &Config,
    database_path: Option<PathBuf>,
    switches: &IndexSwitches,
) -> IndexOptions {
    let database_path = if switches.disable_database {
        None
    } else {
        database_path
    };
    IndexOptions {
        walk_enabled: !switches.disable_walk,
        load_enabled: !switches.disable_load,
        store_enabled: !switches.disable_store,
        dirty_enabled: !switches.disable_dirty,
        refresh_enabled: !switches.disable_refresh,
        ..IndexOptions::from_config(&config.index, database_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn configured(identifiers: &[&str]) -> Config {
        let mut config = Config::default();
        for identifier in identifiers {
            config.libraries.push(LibraryConfig {
                identifier: identifier.to_string(),
                paths: vec![PathBuf::from("/tmp")],
                ..Default::default()
            });
        }
        config
    }

    #[test]
    fn test_paths_and_configuration_are_exclusive() {
        let err = library_configs(&[PathBuf::from("/notes")], &configured(&["notes"])).unwrap_err();
        assert!(err.to_string().contains("--library-path"));
    }

    #[test]
    fn test_no_library_is_an_error() {
        assert!(library_configs(&[], &Config::default()).is_err());

        let mut config = configured(&["old"]);
        config.libraries[0].disabled = true;
        assert!(library_configs(&[], &config).is_err());
    }

    #[test]
    fn test_ad_hoc_library() {
        let configs = library_configs(&[PathBuf::from("/notes")], &Config::default()).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].identifier, "library");
        assert!(configs[0].use_path_in_library_as_identifier);
    }

    #[test]
    fn test_switches_override_configuration() {
        let config = Config::default();
        let database = Some(PathBuf::from("/cache/x.db"));

        let options = index_options(&config, database.clone(), &IndexSwitches::default());
        assert!(options.database_enabled());
        assert!(options.walk_enabled && options.load_enabled && options.dirty_enabled);

        let switches = IndexSwitches {
            disable_database: true,
            disable_walk: true,
            ..Default::default()
        };
        let options = index_options(&config, database, &switches);
        assert!(!options.database_enabled());
        assert!(!options.walk_enabled);
    }

    #[test]
    fn test_database_disabled_in_configuration() {
        let mut config = Config::default();
        config.index.database_enabled = false;
        config.index.documents_refresh_enabled = false;

        let options = index_options(
            &config,
            Some(PathBuf::from("/cache/x.db")),
            &IndexSwitches::default(),
        );
        assert!(!options.database_enabled());
        assert!(!options.documents_refresh_enabled);
    }

    fn notes_settings(notes: &Path, cache: &Path) -> Settings {
        let library = Library::initialize(&LibraryConfig {
            identifier: "notes".to_string(),
            paths: vec![notes.to_path_buf()],
            use_file_extension_as_format: true,
            ..Default::default()
        })
        .unwrap();
        Settings {
            config_path: None,
            identity: None,
            libraries: vec![library],
            options: IndexOptions {
                database_path: Some(cache.join("notes.db")),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_rebuild_never_reads_the_snapshot() {
        let notes = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        fs::write(notes.path().join("intro.md"), "# Intro\n").unwrap();
        fs::write(cache.path().join("notes.db"), b"garbage that is not a snapshot").unwrap();

        assert!(App::open(notes_settings(notes.path(), cache.path())).is_err());

        let app = App::rebuild(notes_settings(notes.path(), cache.path())).unwrap();
        assert_eq!(app.outcome, SyncOutcome::Walked);
        assert_eq!(app.index.len(), 1);

        let reopened = App::open(notes_settings(notes.path(), cache.path())).unwrap();
        assert_eq!(reopened.outcome, SyncOutcome::Loaded);
    }
}
