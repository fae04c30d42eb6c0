//! Status command - show index status and statistics.

use crate::app::Settings;
use scratchpad_core::SnapshotLoad;

/// Run the status command.
///
/// Reads the snapshot directly; nothing is walked or written.
pub fn run(settings: Settings) -> anyhow::Result<()> {
    println!("Scratchpad Index Status");
    println!("=======================");
    println!();

    match settings.config_path {
        Some(ref path) => println!("Configuration: {}", path.display()),
        None => println!("Configuration: none (ad-hoc library)"),
    }
    if let Some(ref identity) = settings.identity {
        println!("Identity:      {}", identity);
    }

    println!();
    println!("Libraries:");
    for library in &settings.libraries {
        let paths: Vec<String> = library.paths.iter().map(|p| p.display().to_string()).collect();
        let mut flags = Vec::new();
        if library.edit_enabled {
            flags.push("edit");
        }
        if library.create_enabled() {
            flags.push("create");
        }
        if library.snapshot_extension.is_some() {
            flags.push("snapshot");
        }
        println!("  {} ({}) [{}]", library.id, paths.join(", "), flags.join(", "));
    }

    println!();
    let Some(store) = settings.store() else {
        println!("Database disabled. The index is rebuilt on every run.");
        return Ok(());
    };

    println!("Snapshot:      {}", store.path().display());
    let Some(modified) = store.modified()? else {
        println!("  Not written yet. Run 'scratchpad index' to build it.");
        return Ok(());
    };
    println!("  Written:     {}", modified.format("%Y-%m-%d %H:%M:%S"));

    if let Some(dirty) = store.dirty_modified()? {
        println!("  Dirty mark:  {}", dirty.format("%Y-%m-%d %H:%M:%S"));
        if dirty > modified {
            println!("  ⚠ stale: the next run walks the libraries");
        }
    }

    match store.load()? {
        SnapshotLoad::Loaded(snapshot) => {
            println!("  Documents:   {}", snapshot.documents.len());
            if let Some(refreshed) = snapshot.refreshed_at {
                println!("  Refreshed:   {}", refreshed.format("%Y-%m-%d %H:%M:%S"));
            }
            if !snapshot.matches_libraries(&settings.libraries) {
                println!("  ⚠ built from a different library configuration");
            }
        }
        SnapshotLoad::Incompatible { found, expected } => {
            println!("  ⚠ format version {} (expected {}), will be rebuilt", found, expected);
        }
    }

    Ok(())
}
