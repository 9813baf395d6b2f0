// src/cli.rs
//! Command-line interface of the `collect` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Collect news from configured sources")]
pub struct Cli {
    /// Collector config file (TOML); falls back to $COLLECTOR_CONFIG_PATH, then config/collector.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// JSON store file; overrides the config's `store_path`
    #[arg(long, env = "COLLECTOR_STORE_PATH", global = true)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run one collection pass
    Run {
        /// Collect only this source (fetched regardless of its interval)
        #[arg(long)]
        source_id: Option<i64>,

        /// Ignore fetch intervals
        #[arg(long)]
        force: bool,

        /// Only sources tagged with this team
        #[arg(long)]
        team: Option<String>,
    },

    /// Import sources from a JSON file
    Import {
        file: PathBuf,

        /// Overwrite sources that already exist (matched by name)
        #[arg(long)]
        update: bool,
    },

    /// List configured sources
    Sources,

    /// Run one AI post-processing pass (needs the `openrouter` job enabled)
    Ai {
        /// Only articles from this team's sources
        #[arg(long)]
        team: Option<String>,
    },
}
