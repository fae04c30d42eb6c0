//! Show command - print a document's body.

use crate::app::{App, Settings};

/// Run the show command.
///
/// The document is re-read first when its file changed since it was indexed.
pub fn run(settings: Settings, identifier: &str) -> anyhow::Result<()> {
    let app = App::open(settings)?;
    let document = app.index.refresh_document(identifier)?;

    println!("{}", document.body());
    Ok(())
}
