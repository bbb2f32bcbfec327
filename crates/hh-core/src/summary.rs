//! Time-weighted activity summaries.
//!
//! # Algorithm Summary
//!
//! 1. Group events by session and sort each group by timestamp (stable, so
//!    ties keep arrival order)
//! 2. Each event is credited with the time until the next boundary: the next
//!    event of its session, else the session end, else `now` for a session
//!    that is still open; the boundary is clipped to the end of the window
//! 3. The credit is capped at the idle cap and floored at zero
//! 4. Credits accumulate into the language, project, file, hour, day, and
//!    language x hour buckets, and `total_time_ms` is their sum
//!
//! Because the total is the sum of per-event credits, every bucket family
//! sums exactly to it. Session wall-clock overlap with the window is not
//! used: it would count idle time inside a session that no event accounts
//! for.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::event::Event;
use crate::range::{events_in_range, sessions_in_range};
use crate::session::Session;
use crate::store::Collection;
use crate::time::{HOURS_PER_DAY, TimeRange, date_key, hour_of_day};
use crate::types::SessionId;

/// Per-hour-of-day histogram in milliseconds.
pub type HourHistogram = [i64; HOURS_PER_DAY];

/// Activity summary for one query window. All values are milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total_time_ms: i64,
    pub files_edited: BTreeMap<String, i64>,
    pub languages: BTreeMap<String, i64>,
    pub projects: BTreeMap<String, i64>,
    pub activity_by_day: BTreeMap<NaiveDate, i64>,
    pub activity_by_hour: HourHistogram,
    pub activity_by_hour_by_language: BTreeMap<String, HourHistogram>,
}

impl Summary {
    fn credit<Tz: TimeZone>(&mut self, event: &Event, duration_ms: i64, tz: &Tz) {
        let hour = hour_of_day(event.timestamp, tz);

        self.total_time_ms += duration_ms;
        *self.languages.entry(event.language.clone()).or_default() += duration_ms;
        *self.projects.entry(event.project.clone()).or_default() += duration_ms;
        *self.files_edited.entry(event.file_path.clone()).or_default() += duration_ms;
        *self
            .activity_by_day
            .entry(date_key(event.timestamp, tz))
            .or_default() += duration_ms;
        self.activity_by_hour[hour] += duration_ms;
        self.activity_by_hour_by_language
            .entry(event.language.clone())
            .or_insert([0; HOURS_PER_DAY])[hour] += duration_ms;
    }
}

/// Sorts a bucket map by time descending, breaking ties by name.
pub fn ranked(buckets: &BTreeMap<String, i64>) -> Vec<(&str, i64)> {
    let mut entries: Vec<_> = buckets.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    entries.sort_by_key(|&(name, ms)| (std::cmp::Reverse(ms), name));
    entries
}

/// Summarizes already-fetched events and sessions, bucketing by local time.
pub fn summarize(
    events: &[Event],
    sessions: &[Session],
    range: &TimeRange,
    idle_cap_ms: i64,
    now: DateTime<Utc>,
) -> Result<Summary, Error> {
    summarize_in(events, sessions, range, idle_cap_ms, now, &Local)
}

/// Summarizes already-fetched events and sessions, bucketing hours and days
/// in `tz`.
///
/// Events outside `range` are ignored. Events whose session is not in
/// `sessions` are treated as belonging to an open session.
pub fn summarize_in<Tz: TimeZone>(
    events: &[Event],
    sessions: &[Session],
    range: &TimeRange,
    idle_cap_ms: i64,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Result<Summary, Error> {
    if idle_cap_ms < 0 {
        return Err(Error::InvalidIdleCap(idle_cap_ms));
    }
    if range.from > range.to {
        return Err(Error::InvalidRange {
            from: range.from,
            to: range.to,
        });
    }

    let sessions_by_id: HashMap<&SessionId, &Session> =
        sessions.iter().map(|s| (&s.session_id, s)).collect();

    let mut events_by_session: HashMap<&SessionId, Vec<&Event>> = HashMap::new();
    for event in events.iter().filter(|e| range.contains(e.timestamp)) {
        events_by_session
            .entry(&event.session_id)
            .or_default()
            .push(event);
    }

    let mut summary = Summary::default();
    for (session_id, mut group) in events_by_session {
        group.sort_by_key(|e| e.timestamp);
        let session_end = sessions_by_id
            .get(session_id)
            .and_then(|s| s.end_timestamp)
            .unwrap_or(now);

        for (i, event) in group.iter().enumerate() {
            let boundary = group
                .get(i + 1)
                .map_or(session_end, |next| next.timestamp)
                .min(range.to);
            let duration_ms = (boundary - event.timestamp)
                .num_milliseconds()
                .min(idle_cap_ms);
            if duration_ms <= 0 {
                continue;
            }
            summary.credit(event, duration_ms, tz);
        }
    }

    Ok(summary)
}

/// Fetches the window's events and sessions from `store` and summarizes them
/// in local time.
pub fn build_summary<S>(
    store: &S,
    range: &TimeRange,
    idle_cap_ms: i64,
    now: DateTime<Utc>,
) -> Result<Summary, Error>
where
    S: Collection<Event> + Collection<Session>,
{
    let events = events_in_range(store, range)?;
    let sessions = sessions_in_range(store, range)?;
    tracing::debug!(
        events = events.len(),
        sessions = sessions.len(),
        "summarizing range"
    );
    summarize(&events, &sessions, range, idle_cap_ms, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::minutes_to_ms;
    use chrono::{Duration, FixedOffset};

    const MIN: i64 = 60_000;

    fn ts(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, hour, min, 0).unwrap()
    }

    fn event(session: &str, at: DateTime<Utc>, language: &str, file: &str) -> Event {
        Event {
            timestamp: at,
            file_path: file.to_string(),
            language: language.to_string(),
            project: "A".to_string(),
            session_id: SessionId::new(session).unwrap(),
        }
    }

    fn closed(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Session {
        Session {
            session_id: SessionId::new(id).unwrap(),
            start_timestamp: start,
            end_timestamp: Some(end),
            duration_ms: (end - start).num_milliseconds(),
        }
    }

    fn range(from: DateTime<Utc>, to: DateTime<Utc>) -> TimeRange {
        TimeRange::new(from, to).unwrap()
    }

    fn run(events: &[Event], sessions: &[Session], window: TimeRange, cap: i64) -> Summary {
        summarize_in(events, sessions, &window, cap, ts(23, 0), &Utc).unwrap()
    }

    fn assert_partitions(summary: &Summary) {
        let total = summary.total_time_ms;
        assert_eq!(summary.languages.values().sum::<i64>(), total);
        assert_eq!(summary.projects.values().sum::<i64>(), total);
        assert_eq!(summary.files_edited.values().sum::<i64>(), total);
        assert_eq!(summary.activity_by_day.values().sum::<i64>(), total);
        assert_eq!(summary.activity_by_hour.iter().sum::<i64>(), total);
        let by_language: i64 = summary
            .activity_by_hour_by_language
            .values()
            .flat_map(|h| h.iter())
            .sum();
        assert_eq!(by_language, total);
    }

    #[test]
    fn test_language_breakdown_for_two_hour_session() {
        let sessions = [closed("s1", ts(10, 0), ts(12, 0))];
        let events = [
            event("s1", ts(10, 0), "TypeScript", "a.ts"),
            event("s1", ts(10, 30), "TypeScript", "a.ts"),
            event("s1", ts(11, 0), "JavaScript", "b.js"),
        ];

        let summary = run(&events, &sessions, range(ts(10, 0), ts(12, 0)), minutes_to_ms(90));

        assert_eq!(summary.languages["TypeScript"], 60 * MIN);
        assert_eq!(summary.languages["JavaScript"], 60 * MIN);
        assert_eq!(summary.total_time_ms, 120 * MIN);
        assert_eq!(summary.files_edited["a.ts"], 60 * MIN);
        assert_eq!(summary.activity_by_hour[10], 60 * MIN);
        assert_eq!(summary.activity_by_hour[11], 60 * MIN);
        assert_eq!(summary.activity_by_hour_by_language["TypeScript"][10], 60 * MIN);
        assert_eq!(summary.activity_by_hour_by_language["JavaScript"][11], 60 * MIN);
        assert_partitions(&summary);
    }

    #[test]
    fn test_gap_longer_than_idle_cap_is_capped() {
        let sessions = [closed("s1", ts(10, 0), ts(10, 45))];
        let events = [
            event("s1", ts(10, 0), "Rust", "a.rs"),
            event("s1", ts(10, 45), "Rust", "b.rs"),
        ];

        let summary = run(&events, &sessions, range(ts(9, 0), ts(13, 0)), minutes_to_ms(30));

        assert_eq!(summary.files_edited["a.rs"], 30 * MIN);
        // The last event ends exactly at the session end and earns nothing.
        assert!(!summary.files_edited.contains_key("b.rs"));
        assert_eq!(summary.total_time_ms, 30 * MIN);
    }

    #[test]
    fn test_final_event_of_closed_session_runs_to_session_end() {
        let sessions = [closed("s1", ts(10, 0), ts(10, 20))];
        let events = [event("s1", ts(10, 5), "Go", "main.go")];

        let summary = run(&events, &sessions, range(ts(9, 0), ts(13, 0)), minutes_to_ms(30));

        assert_eq!(summary.total_time_ms, 15 * MIN);
    }

    #[test]
    fn test_open_session_runs_to_now_under_cap() {
        let events = [event("live", ts(22, 50), "Go", "main.go")];
        let sessions = [Session::open(SessionId::new("live").unwrap(), ts(22, 50))];

        let summary = run(&events, &sessions, range(ts(0, 0), ts(23, 59)), minutes_to_ms(30));
        assert_eq!(summary.total_time_ms, 10 * MIN);

        let capped = run(&events, &sessions, range(ts(0, 0), ts(23, 59)), minutes_to_ms(5));
        assert_eq!(capped.total_time_ms, 5 * MIN);
    }

    #[test]
    fn test_event_without_fetched_session_is_treated_as_open() {
        let events = [event("unknown", ts(22, 55), "Go", "main.go")];
        let summary = run(&events, &[], range(ts(0, 0), ts(23, 59)), minutes_to_ms(30));
        assert_eq!(summary.total_time_ms, 5 * MIN);
    }

    #[test]
    fn test_boundary_is_clipped_to_range_end() {
        let sessions = [closed("s1", ts(10, 0), ts(12, 0))];
        let events = [
            event("s1", ts(10, 50), "Rust", "a.rs"),
            event("s1", ts(11, 20), "Rust", "a.rs"),
        ];

        let summary = run(&events, &sessions, range(ts(10, 0), ts(11, 0)), minutes_to_ms(60));

        // Only the first event is inside the window, and it is clipped at 11:00.
        assert_eq!(summary.total_time_ms, 10 * MIN);
    }

    #[test]
    fn test_events_outside_window_contribute_nothing() {
        let sessions = [closed("s1", ts(8, 0), ts(9, 0))];
        let events = [event("s1", ts(8, 0), "Rust", "a.rs")];

        let summary = run(&events, &sessions, range(ts(10, 0), ts(11, 0)), minutes_to_ms(60));

        assert_eq!(summary, Summary::default());
    }

    #[test]
    fn test_empty_window_yields_zeroed_summary() {
        let summary = run(&[], &[], range(ts(10, 0), ts(12, 0)), minutes_to_ms(30));

        assert_eq!(summary.total_time_ms, 0);
        assert!(summary.languages.is_empty());
        assert!(summary.projects.is_empty());
        assert!(summary.files_edited.is_empty());
        assert!(summary.activity_by_day.is_empty());
        assert!(summary.activity_by_hour_by_language.is_empty());
        assert_eq!(summary.activity_by_hour, [0; HOURS_PER_DAY]);
    }

    #[test]
    fn test_unsorted_input_and_ties_keep_arrival_order() {
        let sessions = [closed("s1", ts(10, 0), ts(10, 30))];
        // Two events at the same instant: the first one gets zero, the
        // second one runs to the next event.
        let events = [
            event("s1", ts(10, 20), "Rust", "c.rs"),
            event("s1", ts(10, 0), "Rust", "a.rs"),
            event("s1", ts(10, 0), "Rust", "b.rs"),
        ];

        let summary = run(&events, &sessions, range(ts(10, 0), ts(11, 0)), minutes_to_ms(60));

        assert!(!summary.files_edited.contains_key("a.rs"));
        assert_eq!(summary.files_edited["b.rs"], 20 * MIN);
        assert_eq!(summary.files_edited["c.rs"], 10 * MIN);
    }

    #[test]
    fn test_sessions_are_apportioned_independently() {
        let sessions = [
            closed("s1", ts(9, 0), ts(9, 10)),
            closed("s2", ts(9, 5), ts(9, 20)),
        ];
        let events = [
            event("s1", ts(9, 0), "Rust", "a.rs"),
            event("s2", ts(9, 5), "Python", "b.py"),
        ];

        let summary = run(&events, &sessions, range(ts(9, 0), ts(10, 0)), minutes_to_ms(60));

        assert_eq!(summary.languages["Rust"], 10 * MIN);
        assert_eq!(summary.languages["Python"], 15 * MIN);
        assert_partitions(&summary);
    }

    #[test]
    fn test_days_and_hours_use_the_given_zone() {
        let sessions = [closed("s1", ts(23, 0), ts(23, 30))];
        let events = [event("s1", ts(23, 0), "Rust", "a.rs")];
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();

        let summary = summarize_in(
            &events,
            &sessions,
            &range(ts(0, 0), ts(23, 59)),
            minutes_to_ms(60),
            ts(23, 59),
            &tz,
        )
        .unwrap();

        let next_day = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        assert_eq!(summary.activity_by_day[&next_day], 30 * MIN);
        assert_eq!(summary.activity_by_hour[1], 30 * MIN);
    }

    #[test]
    fn test_summarize_is_deterministic() {
        let sessions = [
            closed("s1", ts(10, 0), ts(12, 0)),
            closed("s2", ts(13, 0), ts(14, 0)),
        ];
        let events: Vec<_> = (0..40)
            .map(|i| {
                let session = if i % 2 == 0 { "s1" } else { "s2" };
                let base = if i % 2 == 0 { ts(10, 0) } else { ts(13, 0) };
                event(session, base + Duration::minutes(i), "Rust", &format!("f{}.rs", i % 3))
            })
            .collect();
        let window = range(ts(0, 0), ts(23, 0));

        let first = run(&events, &sessions, window, minutes_to_ms(2));
        let second = run(&events, &sessions, window, minutes_to_ms(2));

        assert_eq!(first, second);
        assert_partitions(&first);
    }

    #[test]
    fn test_negative_idle_cap_is_rejected() {
        let result = summarize_in(&[], &[], &range(ts(10, 0), ts(11, 0)), -1, ts(12, 0), &Utc);
        assert!(matches!(result, Err(Error::InvalidIdleCap(-1))));
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let inverted = TimeRange {
            from: ts(11, 0),
            to: ts(10, 0),
        };
        let events = [event("s1", ts(10, 30), "Rust", "a.rs")];

        let result = summarize_in(&events, &[], &inverted, MIN, ts(12, 0), &Utc);
        assert!(matches!(
            result,
            Err(Error::InvalidRange { from, to }) if from == ts(11, 0) && to == ts(10, 0)
        ));
    }

    #[test]
    fn test_ranked_orders_by_time_then_name() {
        let buckets: BTreeMap<String, i64> = [("b", 5), ("a", 5), ("c", 9)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(ranked(&buckets), [("c", 9), ("a", 5), ("b", 5)]);
    }
}
