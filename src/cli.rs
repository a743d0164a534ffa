//! CLI argument parsing via clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskpulse::build_info;

/// Track background agent tasks and keep their chat status messages current.
#[derive(Debug, Parser)]
#[command(
    name = "taskpulse",
    version = build_info::VERSION,
    long_version = build_info::LONG_VERSION,
    after_help = build_info::HELP_BUILD_METADATA
)]
pub struct Args {
    /// Path to config file (default: ./taskpulse.toml or ~/.config/taskpulse/taskpulse.toml).
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<String>,

    /// Override the task store directory.
    #[arg(long = "store-dir", global = true, value_name = "DIR")]
    pub store_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Feed JSON-line signals into a listener and print its chat messages.
    Replay {
        /// Signal file, one envelope or `{"completion":{...}}` per line. Reads stdin when omitted.
        file: Option<PathBuf>,

        /// Chat the status messages are posted to.
        #[arg(long = "chat", default_value = "console")]
        chat: String,

        /// Message id the first status post replies to.
        #[arg(long = "reply-to")]
        reply_to: Option<String>,

        /// Delay between lines, to watch periodic flushes happen.
        #[arg(long = "pace-ms", default_value_t = 0)]
        pace_ms: u64,
    },

    /// List stored tasks for a chat, newest first.
    Tasks {
        #[arg(long = "chat")]
        chat: String,

        /// Only pending, running or waiting tasks.
        #[arg(long = "active")]
        active: bool,

        #[arg(long = "limit", default_value_t = 20)]
        limit: usize,
    },

    /// Evict expired task records.
    Prune {
        /// Also fail every non-terminal record with this reason.
        #[arg(long = "mark-stale", value_name = "REASON")]
        mark_stale: Option<String>,
    },
}
