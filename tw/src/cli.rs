//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::SessionStatus;

/// Tripwright - plan-and-execute travel research
#[derive(Parser)]
#[command(
    name = "tw",
    about = "Research a trip with a planner, two research workers and a synthesizer",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Research a trip and print the itinerary
    Plan {
        /// Where and what; prompted for when missing
        query: Option<String>,

        /// City you travel from
        #[arg(short, long)]
        origin: Option<String>,

        /// When you travel
        #[arg(short, long)]
        date: Option<String>,

        /// How many days
        #[arg(short = 'n', long)]
        days: Option<String>,

        /// Never prompt; missing details stay unspecified
        #[arg(short = 'y', long)]
        no_prompt: bool,
    },

    /// Continue an interrupted or failed session
    Resume {
        /// Session id or unique prefix
        id: String,
    },

    /// List checkpointed sessions
    Sessions {
        /// Only sessions with this status (running, complete, failed)
        #[arg(short, long)]
        status: Option<SessionStatus>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show one session
    Show {
        /// Session id or unique prefix
        id: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a session checkpoint
    Delete {
        /// Session id or unique prefix
        id: String,
    },

    /// Run every request in a YAML file concurrently
    Batch {
        /// YAML list of requests (query, origin, date, days)
        file: PathBuf,

        /// Sessions in flight at once (defaults to config)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Write each itinerary to DIR/<session-id>.md
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Build the destination index from a directory of .txt files
    Index {
        /// Directory of plain-text destination documents
        docs_dir: PathBuf,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripwright")
        .join("logs")
        .join("tripwright.log")
}

/// Generate the after_help text with API key checks and the log path
pub fn generate_after_help(llm_key_env: &str, search_key_env: &str) -> String {
    debug!("generate_after_help: called");
    let mut help = String::new();

    help.push_str("API Keys:\n");
    for env in [llm_key_env, search_key_env] {
        let icon = if std::env::var(env).is_ok() {
            "\u{2705}"
        } else {
            "\u{274C}"
        };
        help.push_str(&format!("  {} {}\n", icon, env));
    }

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}

/// Output format for listing commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use text or json", s)),
        }
    }
}
