//! CLI subcommand implementations.

pub mod init;
pub mod lifecycle;
pub mod report;
pub mod status;
pub mod util;
