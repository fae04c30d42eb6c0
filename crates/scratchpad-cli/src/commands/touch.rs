//! Touch command - mark the index snapshot dirty.

use crate::app::{App, Settings};

/// Run the touch command.
pub fn run(settings: Settings) -> anyhow::Result<()> {
    let app = App::open(settings)?;

    if !app.index.mark_dirty()? {
        anyhow::bail!("dirty tracking is disabled (no database or --index-disable-dirty)");
    }
    if let Some(store) = app.coordinator.store() {
        println!("Marked {} dirty.", store.path().display());
    }
    Ok(())
}
