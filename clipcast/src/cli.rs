//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::logging::LoggingOptions;

/// Compose a broadcast-ready video from remote clips and stream it live.
#[derive(Debug, Parser)]
#[command(name = "clipcast", author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (TOML). Defaults to the per-user config file if present.
    #[arg(long, global = true, env = "CLIPCAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter directives, e.g. `clipcast=debug`.
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Also write daily rotated log files into this directory.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Directory for temp files and outputs; overrides the config file.
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Args {
    pub fn logging_options(&self) -> LoggingOptions {
        LoggingOptions {
            filter: self.log_filter.clone(),
            json: self.json_logs,
            log_dir: self.log_dir.clone(),
        }
    }
}

#[derive(Debug, ClapArgs)]
pub struct DocumentArgs {
    /// Input document (JSON).
    pub document: PathBuf,
}

#[derive(Debug, ClapArgs)]
pub struct BroadcastArgs {
    /// Input document (JSON).
    pub document: PathBuf,

    /// Stream this reference instead of the composed output.
    #[arg(long)]
    pub source: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the composition pipeline.
    Compose(DocumentArgs),
    /// Stream the composed output, or another source, to the document's stream_url.
    Broadcast(BroadcastArgs),
    /// Compose, then broadcast the result.
    Run(DocumentArgs),
    /// Validate a document without touching the network or running any tool.
    Validate(DocumentArgs),
}
