//! List command - print documents or libraries.

use crate::app::{App, Settings};
use crate::OutputFormat;
use scratchpad_core::{Document, Library};
use std::sync::Arc;

/// Run the list command.
pub fn run(
    settings: Settings,
    libraries: bool,
    library: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let app = App::open(settings)?;

    if libraries {
        print_libraries(&app.index.libraries(), &format)?;
        return Ok(());
    }

    let documents = match library {
        Some(ref identifier) => app.index.select_in_library(identifier)?,
        None => app.index.select_all(),
    };
    print_documents(&documents, &format)
}

fn print_libraries(libraries: &[Arc<Library>], format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            for library in libraries {
                let paths: Vec<String> = library.paths.iter().map(|p| p.display().to_string()).collect();
                println!("{}\t{}\t{}", library.id, library.name, paths.join(", "));
            }
        }
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = libraries
                .iter()
                .map(|l| {
                    serde_json::json!({
                        "identifier": l.id.as_str(),
                        "name": l.name,
                        "paths": l.paths,
                        "edit_enabled": l.edit_enabled,
                        "create_enabled": l.create_enabled(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

fn print_documents(documents: &[Arc<Document>], format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            for document in documents {
                println!("{}\t{}", document.id, document.label());
            }
            eprintln!();
            eprintln!("{} documents", documents.len());
        }
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = documents
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "identifier": d.id.to_string(),
                        "library": d.library().as_str(),
                        "title": d.title,
                        "title_alternatives": d.title_alternatives,
                        "format": d.format.to_string(),
                        "path": d.path,
                        "modified": d.modified.map(|t| t.to_rfc3339()),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}
