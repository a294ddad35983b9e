//! CLI definitions for tdm-tree.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "tdm-tree",
    version,
    about = "Inspect and replay the device tree model",
    after_help = "Examples:\n  tdm-tree show --config ./tdm.toml\n  tdm-tree replay --events ./capture.jsonl\n  tdm-tree capabilities"
)]
pub struct Cli {
    /// Log debug events (overrides log.level).
    #[arg(long, short, global = true)]
    pub verbose: bool,
    /// Configuration file (defaults apply when omitted).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load devices from the settings store and print the tree.
    Show,
    /// Apply JSON-lines announcements and print the resulting tree.
    Replay {
        /// Announcement file, one JSON object per line.
        #[arg(long)]
        events: PathBuf,
        /// Stop at the first announcement that fails.
        #[arg(long)]
        strict: bool,
    },
    /// List the canonical capability keys.
    Capabilities,
}
