//! hackhours CLI library.
//!
//! Argument parsing, configuration, the tracking daemon and the report
//! commands behind the `hackhours` binary.

mod cli;
pub mod commands;
pub mod config;
pub mod daemon;

pub use cli::{Cli, Commands, RangeArgs};
pub use config::Config;
