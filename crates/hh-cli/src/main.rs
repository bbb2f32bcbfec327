use std::io::Write;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{CommandFactory, Parser};
use hh_core::Period;
use tracing_subscriber::EnvFilter;

use hh_cli::commands::report::{self, ReportKind, ReportWindow};
use hh_cli::commands::{init, lifecycle, status, util};
use hh_cli::{Cli, Commands, Config, RangeArgs, config, daemon};

fn load_config(cli: &Cli) -> Result<Config> {
    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn period_report<W: Write>(writer: &mut W, cli: &Cli, period: Period, json: bool) -> Result<()> {
    let config = load_config(cli)?;
    let db = util::open_database(&config)?;
    let window = ReportWindow::period(period, Local::now().date_naive(), &Local)?;
    report::run(writer, &db, &config, ReportKind::Overview, &window, json)
}

fn range_report<W: Write>(
    writer: &mut W,
    cli: &Cli,
    kind: ReportKind,
    args: &RangeArgs,
) -> Result<()> {
    let config = load_config(cli)?;
    let db = util::open_database(&config)?;
    let (first, last) = util::resolve_days(args, Local::now().date_naive())?;
    let window = ReportWindow::days(first, last, &Local)?;
    report::run(writer, &db, &config, kind, &window, args.json)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        let fallback = if matches!(cli.command, Some(Commands::Daemon)) {
            "info"
        } else {
            "warn"
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let mut stdout = std::io::stdout();
    match &cli.command {
        Some(Commands::Init {
            directories,
            idle_minutes,
            force,
        }) => {
            let path = cli
                .config
                .clone()
                .or_else(config::default_config_file)
                .context("could not determine config directory; pass --config")?;
            init::run(&mut stdout, &path, directories, *idle_minutes, *force)?;
        }
        Some(Commands::Start) => {
            let config = load_config(&cli)?;
            lifecycle::start(&mut stdout, &config, cli.config.as_deref())?;
        }
        Some(Commands::Stop) => {
            let config = load_config(&cli)?;
            lifecycle::stop(&mut stdout, &config)?;
        }
        Some(Commands::Daemon) => {
            let config = load_config(&cli)?;
            daemon::run(&config)?;
        }
        Some(Commands::Status) => {
            let config = load_config(&cli)?;
            let db = util::open_database(&config)?;
            status::run(&mut stdout, &db, &config)?;
        }
        Some(Commands::Today { json }) => period_report(&mut stdout, &cli, Period::Today, *json)?,
        Some(Commands::Week { json }) => period_report(&mut stdout, &cli, Period::Week, *json)?,
        Some(Commands::Month { json }) => period_report(&mut stdout, &cli, Period::Month, *json)?,
        Some(Commands::Stats(args)) => {
            range_report(&mut stdout, &cli, ReportKind::Overview, args)?;
        }
        Some(Commands::Languages(args)) => {
            range_report(&mut stdout, &cli, ReportKind::Languages, args)?;
        }
        Some(Commands::Projects(args)) => {
            range_report(&mut stdout, &cli, ReportKind::Projects, args)?;
        }
        Some(Commands::Files(args)) => {
            range_report(&mut stdout, &cli, ReportKind::Files, args)?;
        }
        None => {
            Cli::command().print_help()?;
        }
    }

    Ok(())
}
