//! Status command for showing daemon health and recorded activity.

use std::fmt::Display;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone, Utc};
use hh_core::{Collection, Session, SessionFilter};
use hh_db::{Database, RecordCounts};

use crate::Config;
use crate::daemon::state::{DaemonState, StateFile};

/// Everything `status` reports.
#[derive(Debug)]
pub struct StatusReport<'a> {
    pub daemon: Option<DaemonState>,
    pub database_path: &'a Path,
    pub counts: RecordCounts,
    pub open_session: Option<Session>,
    pub last_event_at: Option<DateTime<Utc>>,
}

fn format_time<Tz>(ts: DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    ts.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string()
}

/// Formats the status report with times in `tz`.
pub fn format_status<Tz>(report: &StatusReport<'_>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut lines = vec!["hackhours status".to_string()];
    lines.push(match &report.daemon {
        Some(state) => format!(
            "Daemon:   running (pid {}, since {})",
            state.pid,
            format_time(state.started_at, tz)
        ),
        None => "Daemon:   not running".to_string(),
    });
    lines.push(format!("Database: {}", report.database_path.display()));
    lines.push(format!(
        "Sessions: {} ({} open)",
        report.counts.sessions, report.counts.open_sessions
    ));
    lines.push(format!("Events:   {}", report.counts.events));
    if let Some(session) = &report.open_session {
        lines.push(format!(
            "Current session started {}",
            format_time(session.start_timestamp, tz)
        ));
    }
    lines.push(match report.last_event_at {
        Some(ts) => format!("Last activity: {}", format_time(ts, tz)),
        None => "No activity recorded.".to_string(),
    });

    let mut output = lines.join("\n");
    output.push('\n');
    output
}

pub fn run<W: Write>(writer: &mut W, db: &Database, config: &Config) -> Result<()> {
    let daemon = StateFile::new(&config.state_path).running()?;
    let open_session = Collection::<Session>::find(db, &SessionFilter::Open)?
        .into_iter()
        .max_by_key(|s| s.start_timestamp);

    let report = StatusReport {
        daemon,
        database_path: &config.database_path,
        counts: db.record_counts()?,
        open_session,
        last_event_at: db.last_event_at()?,
    };
    write!(writer, "{}", format_status(&report, &Local))?;
    Ok(())
}
