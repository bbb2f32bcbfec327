//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// Passive coding-activity tracker.
///
/// Watches your project directories, groups file edits into sessions split by
/// idle gaps, and reports where your time went.
#[derive(Debug, Parser)]
#[command(name = "hackhours", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a config file with the directories to track.
    Init {
        /// Directories to track (defaults to the current directory).
        directories: Vec<PathBuf>,

        /// Minutes without activity before a session closes.
        #[arg(long)]
        idle_minutes: Option<u32>,

        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },

    /// Start the tracking daemon in the background.
    Start,

    /// Stop the background daemon.
    Stop,

    /// Run the tracking daemon in the foreground.
    Daemon,

    /// Show whether the daemon is running and what has been recorded.
    Status,

    /// Summarize today's activity.
    Today {
        #[arg(long)]
        json: bool,
    },

    /// Summarize the last 7 days.
    Week {
        #[arg(long)]
        json: bool,
    },

    /// Summarize the last 30 days.
    Month {
        #[arg(long)]
        json: bool,
    },

    /// Summarize an arbitrary range of days.
    Stats(RangeArgs),

    /// Time per language.
    Languages(RangeArgs),

    /// Time per project.
    Projects(RangeArgs),

    /// The most-edited files.
    Files(RangeArgs),
}

/// A span of local calendar days, inclusive at both ends.
#[derive(Debug, Clone, Args)]
pub struct RangeArgs {
    /// First day (YYYY-MM-DD). Defaults to six days before `--to`.
    #[arg(long, value_parser = parse_day)]
    pub from: Option<NaiveDate>,

    /// Last day (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_day)]
    pub to: Option<NaiveDate>,

    /// Output JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

fn parse_day(value: &str) -> Result<NaiveDate, String> {
    hh_core::time::parse_date_key(value).map_err(|e| e.to_string())
}
