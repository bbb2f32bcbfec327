//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Default idle threshold before a session closes.
pub const DEFAULT_IDLE_MINUTES: u32 = 2;

/// Default seconds between idle checks.
pub const DEFAULT_IDLE_CHECK_INTERVAL_SECS: u64 = 10;

/// Globs excluded from tracking unless the config overrides the list.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/node_modules/**",
    "**/.git/**",
    "**/dist/**",
    "**/build/**",
    "**/.next/**",
    "**/.turbo/**",
    "**/.cache/**",
    "**/.idea/**",
    "**/.vscode/**",
    "**/*.log",
];

/// Application configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Path to the daemon state file.
    pub state_path: PathBuf,
    /// Directories watched for file activity.
    pub directories: Vec<PathBuf>,
    /// Minutes without activity before a session closes.
    pub idle_minutes: u32,
    /// Glob patterns for paths that are never tracked.
    pub exclude: Vec<String>,
    /// Seconds between idle checks in the daemon.
    pub idle_check_interval_secs: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("state_path", &self.state_path)
            .field("directories", &self.directories)
            .field("idle_minutes", &self.idle_minutes)
            .field("exclude", &self.exclude.len())
            .field("idle_check_interval_secs", &self.idle_check_interval_secs)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        let state_dir = dirs_state_path().unwrap_or_else(|| data_dir.clone());
        Self {
            database_path: data_dir.join("hackhours.db"),
            state_path: state_dir.join("daemon.json"),
            directories: std::env::current_dir().into_iter().collect(),
            idle_minutes: DEFAULT_IDLE_MINUTES,
            exclude: DEFAULT_EXCLUDES.iter().map(|s| (*s).to_string()).collect(),
            idle_check_interval_secs: DEFAULT_IDLE_CHECK_INTERVAL_SECS,
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(path) = default_config_file() {
            figment = figment.merge(Toml::file(path));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (HH_*)
        figment = figment.merge(Env::prefixed("HH_"));

        figment.extract()
    }

    /// Path to the daemon's log file, next to its state file.
    pub fn log_path(&self) -> PathBuf {
        self.state_path.with_file_name("daemon.log")
    }
}

/// Returns the default config file path (`<config_dir>/hackhours/config.toml`).
pub fn default_config_file() -> Option<PathBuf> {
    dirs_config_path().map(|p| p.join("config.toml"))
}

/// Returns the platform-specific config directory for hackhours.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("hackhours"))
}

/// Returns the platform-specific data directory for hackhours.
///
/// On Linux: `~/.local/share/hackhours`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("hackhours"))
}

/// Returns the platform-specific state directory for hackhours.
///
/// On Linux: `~/.local/state/hackhours`
pub fn dirs_state_path() -> Option<PathBuf> {
    dirs::state_dir().map(|p| p.join("hackhours"))
}
