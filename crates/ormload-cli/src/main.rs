//! ormload command-line tool
//!
//! Reads a JSON mapping document and prints the SQL of entity and
//! collection loads, exports the mapped schema, or runs loads against a
//! SQLite database.

mod commands;
mod formatter;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use formatter::OutputFormat;

/// ormload command-line tool
#[derive(Parser, Debug)]
#[command(name = "ormload")]
#[command(version, about = "Inspect and run ormload load plans")]
pub struct Args {
    /// JSON mapping document
    #[arg(short, long)]
    pub mapping: PathBuf,

    /// Override the dialect named by the mapping document
    #[arg(short, long)]
    pub dialect: Option<String>,

    /// Replace the document's loader settings with ORMLOAD_* environment variables
    #[arg(long)]
    pub settings_from_env: bool,

    /// Output format
    #[arg(long, default_value = "text", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by the commands that build a loader.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct LoadOptions {
    /// Join fetch an association path, repeatable
    #[arg(long = "fetch")]
    pub fetches: Vec<String>,

    /// Keys per statement
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Lock mode, e.g. pessimistic_write
    #[arg(long)]
    pub lock: Option<String>,

    /// Lock wait in milliseconds
    #[arg(long)]
    pub lock_timeout: Option<u32>,

    /// Enable a filter, `name` or `name:param=value[,param=value]`, repeatable
    #[arg(long = "filter")]
    pub filters: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the SQL, aliases and plan of an entity load
    Explain {
        entity: String,
        /// Load by this unique property instead of the identifier
        #[arg(long)]
        keyed_on: Option<String>,
        #[command(flatten)]
        options: LoadOptions,
    },
    /// Print the SQL, aliases and plan of a collection initializer
    Collection {
        role: String,
        #[command(flatten)]
        options: LoadOptions,
    },
    /// Print CREATE TABLE statements for the mapped tables
    Schema,
    /// Load entities by key from a SQLite database
    Load {
        /// SQLite database file
        #[arg(long)]
        database: PathBuf,
        entity: String,
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        keyed_on: Option<String>,
        /// Mark loaded entities read-only
        #[arg(long)]
        read_only: bool,
        #[command(flatten)]
        options: LoadOptions,
    },
    /// Initialize collections by owner key from a SQLite database
    Initialize {
        #[arg(long)]
        database: PathBuf,
        role: String,
        #[arg(required = true)]
        owners: Vec<String>,
        #[command(flatten)]
        options: LoadOptions,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ormload_cli=info,ormload_core=warn".into()),
        )
        .init();

    let args = Args::parse();

    match commands::run(args) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
