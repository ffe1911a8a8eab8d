use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use destinationstore::cli::{Cli, Command};
use destinationstore::config::Config;
use destinationstore::{DestinationStore, IndexOptions, IndexOutcome};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let store_path = cli.store.unwrap_or_else(|| config.store_path.clone());

    info!("destinationstore starting at {}", store_path.display());
    let store = DestinationStore::open(&store_path)?;

    match cli.command {
        Command::Index {
            docs_dir,
            chunk_size,
            overlap,
        } => {
            let outcome = store.index_directory(
                &docs_dir,
                IndexOptions {
                    chunk_size: chunk_size.unwrap_or(config.chunk_size),
                    overlap: overlap.unwrap_or(config.overlap),
                },
            )?;
            match outcome {
                IndexOutcome::Indexed { documents, chunks } => {
                    println!(
                        "{} Indexed {} documents into {} chunks",
                        "✓".green(),
                        documents.to_string().cyan(),
                        chunks.to_string().cyan()
                    );
                }
                IndexOutcome::AlreadyIndexed => {
                    println!("{} Index already exists at {}", "•".yellow(), store_path.display());
                }
            }
        }
        Command::Retrieve { query, k } => {
            let snippets = store.retrieve(&query, k.unwrap_or(config.top_k))?;
            if snippets.is_empty() {
                println!("No matching snippets");
            }
            for s in snippets {
                println!("{} {} {}", s.chunk_id.yellow(), format!("{:.2}", s.score).dimmed(), s.source.dimmed());
                println!("{}\n", s.text);
            }
        }
        Command::Stats => {
            let stats = store.stats()?;
            println!("Index: {}", store_path.display().to_string().cyan());
            println!("  Chunks: {}", stats.chunk_count);
            println!("  Total chars: {}", stats.total_chars);
            println!("  Sources: {}", stats.source_count);
        }
        Command::Clear => {
            store.clear()?;
            println!("{} Cleared index at {}", "✓".green(), store_path.display());
        }
    }

    Ok(())
}
