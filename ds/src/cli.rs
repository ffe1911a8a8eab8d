//! CLI argument parsing for destinationstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ds")]
#[command(author, version, about = "Destination document index", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the index directory
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the index from a directory of .txt guides (skipped if one exists)
    Index {
        /// Directory holding destination documents
        #[arg(required = true)]
        docs_dir: PathBuf,

        /// Chunk size in characters (default: 500)
        #[arg(short = 'z', long)]
        chunk_size: Option<usize>,

        /// Overlap between chunks in characters (default: 50)
        #[arg(short, long)]
        overlap: Option<usize>,
    },

    /// Return the closest chunks for a query
    Retrieve {
        /// Free-text query
        #[arg(required = true)]
        query: String,

        /// Number of snippets (default: 3)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Show index statistics
    Stats,

    /// Delete the index
    Clear,
}
