//! Docket CLI
//!
//! Command-line tools for inspecting and maintaining a file-backed docket
//! store.
//!
//! # Commands
//!
//! - `doc` - Read or delete a single document
//! - `keys` - List keys, optionally under a prefix
//! - `index` - List, edit, inspect and verify indexes
//! - `compact` - Rewrite the commit log as one snapshot record

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Docket command-line store tools.
#[derive(Parser)]
#[command(name = "docket")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the commit log file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read or delete a single document
    #[command(subcommand)]
    Doc(DocCommand),

    /// List stored keys
    Keys {
        /// Only list keys starting with this prefix
        #[arg(long, default_value = "")]
        prefix: String,
    },

    /// Work with an index of string items
    #[command(subcommand)]
    Index(IndexCommand),

    /// Rewrite the commit log as a single snapshot record
    Compact,

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum DocCommand {
    /// Print a document's version and payload as JSON
    Get {
        /// Document key
        key: String,
    },

    /// Delete a document
    Delete {
        /// Document key
        key: String,
    },
}

#[derive(Subcommand)]
enum IndexCommand {
    /// Print every item in order
    List {
        /// Index name
        name: String,
    },

    /// Append items
    Add {
        /// Index name
        name: String,
        /// Items to append
        #[arg(required = true)]
        items: Vec<String>,
        /// Page size used if the index does not exist yet
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Remove items
    Remove {
        /// Index name
        name: String,
        /// Items to remove
        #[arg(required = true)]
        items: Vec<String>,
    },

    /// Delete every page and reset the index
    Clear {
        /// Index name
        name: String,
    },

    /// Show the root and page chain
    Inspect {
        /// Index name
        name: String,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Check the page chain against the root
    Verify {
        /// Index name
        name: String,
    },
}

/// Output format for inspection commands.
#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum Format {
    /// Human-readable summary
    Text,
    /// Pretty-printed JSON
    Json,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("docket CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("docket core v{}", docket_core::VERSION);
        return Ok(());
    }

    let path = cli.path.ok_or("Log path required (--path)")?;

    match cli.command {
        Commands::Doc(DocCommand::Get { key }) => commands::doc::get(&path, &key)?,
        Commands::Doc(DocCommand::Delete { key }) => commands::doc::delete(&path, &key)?,
        Commands::Keys { prefix } => commands::keys::run(&path, &prefix)?,
        Commands::Index(command) => match command {
            IndexCommand::List { name } => commands::index::list(&path, &name)?,
            IndexCommand::Add {
                name,
                items,
                page_size,
            } => commands::index::add(&path, &name, &items, page_size)?,
            IndexCommand::Remove { name, items } => {
                commands::index::remove(&path, &name, &items)?;
            }
            IndexCommand::Clear { name } => commands::index::clear(&path, &name)?,
            IndexCommand::Inspect { name, format } => {
                commands::index::inspect(&path, &name, format)?;
            }
            IndexCommand::Verify { name } => commands::index::verify(&path, &name)?,
        },
        Commands::Compact => commands::compact::run(&path)?,
        Commands::Version => {}
    }

    Ok(())
}
