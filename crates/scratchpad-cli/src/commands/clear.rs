//! Clear command - remove the index snapshot.

use crate::app::Settings;

/// Run the clear command.
pub fn run(settings: Settings) -> anyhow::Result<()> {
    let Some(store) = settings.store() else {
        println!("Database disabled. Nothing to clear.");
        return Ok(());
    };

    if store.clear()? {
        println!("Removed {} and its dirty marker.", store.path().display());
    } else {
        println!("No snapshot found. Nothing to clear.");
    }
    Ok(())
}
