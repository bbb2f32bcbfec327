//! Shared utilities for CLI commands.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use hh_db::Database;

use crate::Config;
use crate::cli::RangeArgs;

/// Days covered by a range command when `--from` is omitted.
const DEFAULT_RANGE_DAYS: i64 = 7;

/// Opens the configured database, creating its parent directory.
pub fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

/// Resolves `--from`/`--to` into an inclusive day span.
///
/// Missing `--to` means `today`; missing `--from` means six days before `--to`.
pub fn resolve_days(args: &RangeArgs, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    let last = args.to.unwrap_or(today);
    let first = args
        .from
        .unwrap_or_else(|| last - Duration::days(DEFAULT_RANGE_DAYS - 1));
    if first > last {
        anyhow::bail!("--from ({first}) is after --to ({last})");
    }
    Ok((first, last))
}
