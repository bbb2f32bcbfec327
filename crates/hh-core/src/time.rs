//! Date-range and duration helpers.
//!
//! Day boundaries and date keys are always computed in an explicit time zone
//! so callers can pin them in tests; the CLI passes [`chrono::Local`].

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::ValidationError;

/// Number of hour-of-day slots in the activity histograms.
pub const HOURS_PER_DAY: usize = 24;

const MS_PER_MINUTE: i64 = 60_000;

/// Converts whole minutes to milliseconds.
pub const fn minutes_to_ms(minutes: u32) -> i64 {
    minutes as i64 * MS_PER_MINUTE
}

/// An inclusive `[from, to]` window of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a range, rejecting `from > to`.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, Error> {
        if from > to {
            return Err(Error::InvalidRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// The range covering whole local days `first..=last`.
    pub fn days<Tz: TimeZone>(first: NaiveDate, last: NaiveDate, tz: &Tz) -> Result<Self, Error> {
        Self::new(start_of_day(first, tz), end_of_day(last, tz))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from <= ts && ts <= self.to
    }
}

/// Named report windows, each ending with the last millisecond of today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    /// Today only.
    Today,
    /// The last 7 days including today.
    Week,
    /// The last 30 days including today.
    Month,
}

impl Period {
    const fn days(self) -> i64 {
        match self {
            Self::Today => 1,
            Self::Week => 7,
            Self::Month => 30,
        }
    }

    /// Resolves the period relative to `today`.
    pub fn range<Tz: TimeZone>(self, today: NaiveDate, tz: &Tz) -> Result<TimeRange, Error> {
        let first = today - Duration::days(self.days() - 1);
        TimeRange::days(first, today, tz)
    }
}

/// Converts a local date at midnight to UTC.
///
/// Ambiguous midnights (DST fall-back) resolve to the earlier instant. A
/// midnight that falls in a DST gap resolves to the first valid instant
/// after it.
pub fn start_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::default());
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => {
            // Gaps are at most a couple of hours; probe forward in 15 minute steps.
            (1..=12)
                .map(|step| midnight + Duration::minutes(15 * step))
                .find_map(|candidate| tz.from_local_datetime(&candidate).earliest())
                .map_or_else(
                    || Utc.from_utc_datetime(&midnight),
                    |dt| dt.with_timezone(&Utc),
                )
        }
    }
}

/// The last millisecond of a local date, in UTC.
pub fn end_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    start_of_day(date + Duration::days(1), tz) - Duration::milliseconds(1)
}

/// The local calendar date of an instant.
pub fn date_key<Tz: TimeZone>(ts: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    ts.with_timezone(tz).date_naive()
}

/// The local hour of an instant, in `0..24`.
pub fn hour_of_day<Tz: TimeZone>(ts: DateTime<Utc>, tz: &Tz) -> usize {
    ts.with_timezone(tz).hour() as usize
}

/// Formats a date key as `YYYY-MM-DD`.
pub fn format_date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses a `YYYY-MM-DD` date key.
pub fn parse_date_key(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ValidationError::InvalidDateKey {
            value: value.to_string(),
        }
    })
}

/// Formats milliseconds as a duration string, rounded to the nearest minute.
///
/// Returns "Xh Ym" if at least one hour, "Ym" otherwise. Zero and negative
/// durations render as "0m".
pub fn format_duration(ms: i64) -> String {
    if ms <= 0 {
        return "0m".to_string();
    }
    let total_minutes = (ms + MS_PER_MINUTE / 2) / MS_PER_MINUTE;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Formats `part / total` as a whole percentage, rounded half up.
pub fn format_percent(part: i64, total: i64) -> String {
    if total <= 0 || part <= 0 {
        return "0%".to_string();
    }
    let percent = (part * 100 + total / 2) / total;
    format!("{percent}%")
}
