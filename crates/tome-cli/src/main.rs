//! Tome CLI
//!
//! Command-line interface for Tome - reading progress and annotation sync.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tome_core::{Config, LibraryStore, SyncDirection};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "tome")]
#[command(about = "Tome - Local-first reading tracker with remote sync")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show status (library counts, sync health)
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Reconcile with the remote server
    Sync {
        /// Limit the pass to one book (id or prefix)
        #[arg(long)]
        book: Option<String>,
        /// Only pull remote changes
        #[arg(long, conflicts_with = "push_only")]
        pull_only: bool,
        /// Only push local changes
        #[arg(long)]
        push_only: bool,
    },
    /// Manage books
    Book {
        #[command(subcommand)]
        command: BookCommands,
    },
    /// Manage annotations
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, server_url, api_token, sync_enabled, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[derive(Subcommand)]
enum BookCommands {
    /// List books
    #[command(alias = "ls")]
    List {
        /// Include soft-deleted books
        #[arg(long)]
        all: bool,
    },
    /// Show book details
    Show {
        /// Book ID (full hash or prefix)
        id: String,
    },
    /// Import a book file
    #[command(alias = "add")]
    Import {
        /// Path to the book file
        path: String,
        /// Title (defaults to the file name)
        #[arg(short = 'T', long)]
        title: Option<String>,
        /// Author
        #[arg(short, long)]
        author: Option<String>,
    },
    /// Open a book: pull remote progress and notes, then show where to resume
    Open {
        /// Book ID (full hash or prefix)
        id: String,
    },
}

#[derive(Subcommand)]
enum NoteCommands {
    /// List annotations on a book
    #[command(alias = "ls")]
    List {
        /// Book ID (full hash or prefix)
        book: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands work without a store
    if let Some(Commands::Config { command }) = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, &output),
            Some(ConfigCommands::Show) | None => commands::config::show(&output),
        };
    }

    let config = Config::load()?;
    let store = LibraryStore::open(&config)?;

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Config { .. } => unreachable!(), // Handled above
        Commands::Status => commands::status::show(&config, &store, &output).await,
        Commands::Sync {
            book,
            pull_only,
            push_only,
        } => {
            let direction = if pull_only {
                SyncDirection::PullOnly
            } else if push_only {
                SyncDirection::PushOnly
            } else {
                SyncDirection::Both
            };
            commands::sync::run(&config, store, book, direction, &output).await
        }
        Commands::Book { command } => match command {
            BookCommands::List { all } => commands::book::list(&store, all, &output),
            BookCommands::Show { id } => commands::book::show(&store, id, &output),
            BookCommands::Import {
                path,
                title,
                author,
            } => commands::book::import(&store, path, title, author, &output),
            BookCommands::Open { id } => {
                commands::book::open(&config, store, id, &output).await
            }
        },
        Commands::Note { command } => match command {
            NoteCommands::List { book } => commands::note::list(&store, book, &output),
        },
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tome_core=warn,tome_cli=warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
