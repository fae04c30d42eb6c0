//! # Scratchpad CLI
//!
//! Command-line interface for inspecting and maintaining Scratchpad note
//! libraries and their index.
//!
//! ## Commands
//!
//! - `scratchpad list` - List documents (or libraries with `--libraries`)
//! - `scratchpad show <identifier>` - Print a document's body (without metadata)
//! - `scratchpad touch` - Mark the index snapshot dirty
//! - `scratchpad index` - Synchronize the index (or rebuild it with `--force`)
//! - `scratchpad status` - Show index status and statistics
//! - `scratchpad clear` - Delete the snapshot and dirty marker
//!
//! ## Example Usage
//!
//! ```bash
//! # Index the notes under ./notes without any configuration file
//! scratchpad --library-path ./notes list
//!
//! # Show one document, re-reading it if it changed
//! scratchpad show library:journal/monday
//!
//! # Another tool edited files behind our back
//! scratchpad touch
//! ```

mod app;
mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Scratchpad - indexed collections of plain-text notes
#[derive(Parser)]
#[command(name = "scratchpad")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "SCRATCHPAD_CONFIGURATION")]
    pub configuration: Option<PathBuf>,

    /// Change into this directory first
    #[arg(long, global = true)]
    pub chdir: Option<PathBuf>,

    /// Index these directories as an ad-hoc library instead of using a configuration
    #[arg(long = "library-path", global = true)]
    pub library_paths: Vec<PathBuf>,

    #[command(flatten)]
    pub index: IndexSwitches,
}

/// Switches turning off parts of the index machinery.
#[derive(Args, Debug, Clone, Default)]
pub struct IndexSwitches {
    /// Never walk the libraries (only use the snapshot)
    #[arg(long = "index-disable-walk", global = true)]
    pub disable_walk: bool,

    /// Do not use a snapshot at all
    #[arg(long = "index-disable-database", global = true)]
    pub disable_database: bool,

    /// Do not load the snapshot
    #[arg(long = "index-disable-load", global = true)]
    pub disable_load: bool,

    /// Do not write the snapshot
    #[arg(long = "index-disable-store", global = true)]
    pub disable_store: bool,

    /// Ignore and never touch the dirty marker
    #[arg(long = "index-disable-dirty", global = true)]
    pub disable_dirty: bool,

    /// Disable lazy library and document refresh
    #[arg(long = "index-disable-refresh", global = true)]
    pub disable_refresh: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List documents or libraries
    #[command(alias = "ls")]
    List {
        /// List libraries instead of documents
        #[arg(long)]
        libraries: bool,

        /// Only list documents of this library
        #[arg(short, long)]
        library: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print a document's body (without metadata)
    Show {
        /// Document identifier (`library:token`)
        identifier: String,
    },

    /// Mark the index snapshot as stale
    Touch,

    /// Synchronize the index with the libraries
    Index {
        /// Walk every library even if the snapshot is fresh
        #[arg(short, long)]
        force: bool,
    },

    /// Show index status and statistics
    Status,

    /// Delete the index snapshot and dirty marker
    Clear,
}

#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    let settings = app::Settings::resolve(&cli.global)?;

    match cli.command {
        Commands::List {
            libraries,
            library,
            format,
        } => commands::list::run(settings, libraries, library, format),
        Commands::Show { identifier } => commands::show::run(settings, &identifier),
        Commands::Touch => commands::touch::run(settings),
        Commands::Index { force } => commands::index::run(settings, force),
        Commands::Status => commands::status::run(settings),
        Commands::Clear => commands::clear::run(settings),
    }
}
