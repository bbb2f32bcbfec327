//! Report commands for summarizing tracked time.
//!
//! This module implements `hackhours today|week|month|stats` and the focused
//! `languages`, `projects` and `files` views, in human-readable and JSON form.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use hh_core::summary::{HourHistogram, ranked};
use hh_core::time::{format_date_key, format_duration, format_percent, minutes_to_ms};
use hh_core::project::project_name;
use hh_core::{Period, Summary, TimeRange, build_summary};
use hh_db::Database;
use serde::Serialize;

use crate::Config;

const NAME_WIDTH: usize = 20;
const BAR_WIDTH: usize = 10;
const TOP_FILES: usize = 10;

/// Which sections a report shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// Totals, languages, projects, days and hours.
    Overview,
    Languages,
    Projects,
    Files,
}

/// The days a report covers and the instants they span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportWindow {
    pub title: &'static str,
    pub first: NaiveDate,
    pub last: NaiveDate,
    pub range: TimeRange,
}

impl ReportWindow {
    /// A named period ending today.
    pub fn period<Tz: TimeZone>(period: Period, today: NaiveDate, tz: &Tz) -> Result<Self> {
        let range = period.range(today, tz)?;
        let (title, days) = match period {
            Period::Today => ("TODAY", 1),
            Period::Week => ("LAST 7 DAYS", 7),
            Period::Month => ("LAST 30 DAYS", 30),
        };
        Ok(Self {
            title,
            first: today - chrono::Duration::days(days - 1),
            last: today,
            range,
        })
    }

    /// Whole days `first..=last`.
    pub fn days<Tz: TimeZone>(first: NaiveDate, last: NaiveDate, tz: &Tz) -> Result<Self> {
        Ok(Self {
            title: "ACTIVITY",
            first,
            last,
            range: TimeRange::days(first, last, tz)?,
        })
    }

    fn describe(&self) -> String {
        if self.first == self.last {
            format!("{}: {}", self.title, format_date_key(self.first))
        } else {
            format!(
                "{}: {} to {}",
                self.title,
                format_date_key(self.first),
                format_date_key(self.last)
            )
        }
    }
}

// ========== Progress Bar ==========

/// Generates a 10-character progress bar.
/// Values <5% of max get a single block for visibility.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn progress_bar(value: i64, max: i64) -> String {
    if max <= 0 {
        return "░".repeat(BAR_WIDTH);
    }

    let ratio = value as f64 / max as f64;
    let filled = if ratio < 0.05 && value > 0 {
        1
    } else {
        ((ratio * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH)
    };

    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

// ========== Text Output ==========

fn write_heading(output: &mut String, heading: &str) {
    writeln!(output).unwrap();
    writeln!(output, "{heading}").unwrap();
    writeln!(output, "{}", "─".repeat(heading.chars().count())).unwrap();
}

fn write_breakdown<S: AsRef<str>>(output: &mut String, rows: &[(S, i64)], total: i64) {
    let max = rows.first().map_or(0, |(_, ms)| *ms);
    for (name, ms) in rows {
        writeln!(
            output,
            "{:<NAME_WIDTH$} {:>7} {:>5}  {}",
            name.as_ref(),
            format_duration(*ms),
            format_percent(*ms, total),
            progress_bar(*ms, max)
        )
        .unwrap();
    }
}

fn project_rows(summary: &Summary) -> Vec<(String, i64)> {
    ranked(&summary.projects)
        .into_iter()
        .map(|(root, ms)| (project_name(root), ms))
        .collect()
}

fn write_files(output: &mut String, summary: &Summary) {
    for (path, ms) in ranked(&summary.files_edited).into_iter().take(TOP_FILES) {
        writeln!(
            output,
            "{:>7} {:>5}  {path}",
            format_duration(ms),
            format_percent(ms, summary.total_time_ms)
        )
        .unwrap();
    }
}

fn write_days(output: &mut String, days: &BTreeMap<NaiveDate, i64>) {
    let max = days.values().copied().max().unwrap_or(0);
    for (date, ms) in days {
        writeln!(
            output,
            "{}  {:>7}  {}",
            format_date_key(*date),
            format_duration(*ms),
            progress_bar(*ms, max)
        )
        .unwrap();
    }
}

fn write_hours(output: &mut String, hours: &HourHistogram) {
    let max = hours.iter().copied().max().unwrap_or(0);
    for (hour, ms) in hours.iter().enumerate().filter(|(_, ms)| **ms > 0) {
        writeln!(
            output,
            "{hour:02}:00  {:>7}  {}",
            format_duration(*ms),
            progress_bar(*ms, max)
        )
        .unwrap();
    }
}

/// Formats the human-readable report output.
pub fn format_report(kind: ReportKind, window: &ReportWindow, summary: &Summary) -> String {
    let mut output = String::new();
    writeln!(output, "{}", window.describe()).unwrap();

    if summary.total_time_ms == 0 {
        writeln!(output).unwrap();
        writeln!(output, "No activity recorded.").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "Hint: Run 'hackhours status' to check tracking health.").unwrap();
        return output;
    }

    writeln!(output).unwrap();
    writeln!(output, "Total time:    {}", format_duration(summary.total_time_ms)).unwrap();
    if kind == ReportKind::Overview {
        writeln!(output, "Files edited:  {}", summary.files_edited.len()).unwrap();
    }

    let total = summary.total_time_ms;
    if matches!(kind, ReportKind::Overview | ReportKind::Languages) {
        write_heading(&mut output, "LANGUAGES");
        write_breakdown(&mut output, &ranked(&summary.languages), total);
    }
    if matches!(kind, ReportKind::Overview | ReportKind::Projects) {
        write_heading(&mut output, "PROJECTS");
        write_breakdown(&mut output, &project_rows(summary), total);
    }
    if kind == ReportKind::Files {
        write_heading(&mut output, "TOP FILES");
        write_files(&mut output, summary);
    }
    if kind == ReportKind::Overview {
        if window.first != window.last {
            write_heading(&mut output, "BY DAY");
            write_days(&mut output, &summary.activity_by_day);
        }
        write_heading(&mut output, "BY HOUR");
        write_hours(&mut output, &summary.activity_by_hour);
    }

    output
}

// ========== JSON Output ==========

/// JSON report structure.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub generated_at: String,
    pub period: JsonPeriod,
    pub total_time_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_edited: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<JsonEntry<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<JsonEntry<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<JsonEntry<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_by_day: Option<&'a BTreeMap<NaiveDate, i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_by_hour: Option<&'a HourHistogram>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_by_hour_by_language: Option<&'a BTreeMap<String, HourHistogram>>,
}

#[derive(Debug, Serialize)]
pub struct JsonPeriod {
    pub start: String,
    pub end: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize)]
pub struct JsonEntry<'a> {
    pub name: &'a str,
    pub time_ms: i64,
}

fn entries(buckets: &BTreeMap<String, i64>) -> Vec<JsonEntry<'_>> {
    ranked(buckets)
        .into_iter()
        .map(|(name, time_ms)| JsonEntry { name, time_ms })
        .collect()
}

/// Formats a report as JSON.
pub fn format_report_json(
    kind: ReportKind,
    window: &ReportWindow,
    summary: &Summary,
    generated_at: DateTime<Utc>,
) -> Result<String> {
    let overview = kind == ReportKind::Overview;
    let mut files = entries(&summary.files_edited);
    files.truncate(TOP_FILES);

    let report = JsonReport {
        generated_at: generated_at.to_rfc3339(),
        period: JsonPeriod {
            start: format_date_key(window.first),
            end: format_date_key(window.last),
            from: window.range.from.to_rfc3339(),
            to: window.range.to.to_rfc3339(),
        },
        total_time_ms: summary.total_time_ms,
        files_edited: overview.then_some(summary.files_edited.len()),
        languages: (overview || kind == ReportKind::Languages)
            .then(|| entries(&summary.languages)),
        projects: (overview || kind == ReportKind::Projects).then(|| entries(&summary.projects)),
        files: (overview || kind == ReportKind::Files).then_some(files),
        activity_by_day: overview.then_some(&summary.activity_by_day),
        activity_by_hour: overview.then_some(&summary.activity_by_hour),
        activity_by_hour_by_language: overview.then_some(&summary.activity_by_hour_by_language),
    };

    Ok(serde_json::to_string_pretty(&report)?)
}

// ========== Public Interface ==========

/// Runs a report command against the database.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    kind: ReportKind,
    window: &ReportWindow,
    json: bool,
) -> Result<()> {
    let now = Utc::now();
    let summary = build_summary(db, &window.range, minutes_to_ms(config.idle_minutes), now)?;
    tracing::debug!(total_ms = summary.total_time_ms, "summary computed");

    if json {
        writeln!(writer, "{}", format_report_json(kind, window, &summary, now)?)?;
    } else {
        write!(writer, "{}", format_report(kind, window, &summary))?;
    }
    Ok(())
}
