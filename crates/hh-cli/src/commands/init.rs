//! Init command for writing the config file.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::{DEFAULT_EXCLUDES, DEFAULT_IDLE_CHECK_INTERVAL_SECS, DEFAULT_IDLE_MINUTES};

/// The settings `init` writes; everything else keeps its default.
#[derive(Debug, Serialize)]
struct InitFile {
    directories: Vec<PathBuf>,
    idle_minutes: u32,
    idle_check_interval_secs: u64,
    exclude: Vec<String>,
}

/// Runs the init command.
///
/// Relative directories are resolved against the current directory.
pub fn run<W: Write>(
    writer: &mut W,
    path: &Path,
    directories: &[PathBuf],
    idle_minutes: Option<u32>,
    force: bool,
) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "config file {} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let directories = if directories.is_empty() {
        vec![std::env::current_dir().context("failed to read current directory")?]
    } else {
        directories
            .iter()
            .map(|dir| std::path::absolute(dir).with_context(|| dir.display().to_string()))
            .collect::<Result<_>>()?
    };
    let file = InitFile {
        directories,
        idle_minutes: idle_minutes.unwrap_or(DEFAULT_IDLE_MINUTES),
        idle_check_interval_secs: DEFAULT_IDLE_CHECK_INTERVAL_SECS,
        exclude: DEFAULT_EXCLUDES.iter().map(|s| (*s).to_string()).collect(),
    };
    let content = toml::to_string_pretty(&file).context("failed to encode config")?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("failed to write {}", path.display()))?;

    writeln!(writer, "Wrote {}", path.display())?;
    for dir in &file.directories {
        writeln!(writer, "Tracking {}", dir.display())?;
    }
    writeln!(writer, "Idle threshold: {} min", file.idle_minutes)?;
    Ok(())
}
