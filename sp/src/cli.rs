//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// SheetPacer - paced, retrying, caching spreadsheet access
#[derive(Parser)]
#[command(
    name = "sp",
    about = "Rate-paced, retrying, caching access layer for a spreadsheet backend",
    version
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

    /// Log pacing delays and cache hits at info level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Drive concurrent reads and writes against an in-memory service
    Simulate {
        /// Number of tab reads to issue
        #[arg(short, long)]
        reads: Option<usize>,

        /// Number of range writes to issue
        #[arg(short, long)]
        writes: Option<usize>,

        /// Number of tabs the reads are spread over
        #[arg(short = 't', long)]
        distinct_tabs: Option<usize>,

        /// Probability that a remote call fails transiently
        #[arg(short = 'f', long)]
        failure_rate: Option<f64>,

        /// Latency of each remote call in milliseconds
        #[arg(long)]
        latency_ms: Option<u64>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

/// Output format for reports
#[derive(Clone, Debug, Default, PartialEq, Eq)]
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
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

/// Location of the log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sheetpacer")
        .join("logs")
        .join("sheetpacer.log")
}
