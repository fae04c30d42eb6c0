//! Index command - synchronize or rebuild the document index.

use crate::app::{App, Settings};
use scratchpad_core::SyncOutcome;
use std::time::Instant;

/// Run the index command.
pub fn run(settings: Settings, force: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let app = if force {
        App::rebuild(settings)?
    } else {
        App::open(settings)?
    };

    let action = if force {
        "Rebuilt"
    } else {
        match app.outcome {
            SyncOutcome::Unchanged => "Unchanged",
            SyncOutcome::Loaded => "Loaded from snapshot",
            SyncOutcome::Walked => "Walked",
        }
    };

    let elapsed = start.elapsed();
    let stats = app.index.stats();

    println!("{}.", action);
    println!("  Libraries: {}", stats.library_count);
    println!("  Documents: {}", stats.document_count);
    println!("  Time:      {:.2}s", elapsed.as_secs_f64());
    match app.coordinator.store() {
        Some(store) if app.settings.options.store_enabled => {
            println!("  Snapshot:  {}", store.path().display());
        }
        _ => println!("  Snapshot:  not stored"),
    }

    Ok(())
}
