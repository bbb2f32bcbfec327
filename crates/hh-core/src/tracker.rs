//! Session segmentation.
//!
//! The tracker turns a stream of file touches into sessions. It is either
//! idle (no open session) or active (one open session and the time of the
//! last recorded touch). A periodic idle check closes the active session once
//! the gap since the last touch exceeds the idle threshold.
//!
//! Sessions close at the last recorded touch, not at the moment idleness is
//! detected, so measured durations do not depend on how often the check runs.
//!
//! # Failure handling
//!
//! Storage writes are not retried. A failed write leaves the in-memory state
//! where it was before the call, so the caller can log, drop the signal, and
//! carry on. The touch time only advances after its event is stored.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::aggregate::Aggregate;
use crate::error::Error;
use crate::event::{Event, EventFilter};
use crate::language::detect_language;
use crate::project::resolve_project_root;
use crate::session::{Session, SessionFilter};
use crate::store::{Collection, Record, StoreError};
use crate::time::{date_key, minutes_to_ms};
use crate::types::SessionId;

/// Tracker configuration, fixed for the tracker's lifetime.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Gap after the last touch beyond which the session closes.
    pub idle_threshold_ms: i64,
    /// Tracked directory roots, used to resolve projects.
    pub directories: Vec<PathBuf>,
}

impl TrackerConfig {
    pub fn new(idle_minutes: u32, directories: Vec<PathBuf>) -> Self {
        Self {
            idle_threshold_ms: minutes_to_ms(idle_minutes),
            directories,
        }
    }
}

/// The open session and what has been recorded into it.
#[derive(Debug, Clone)]
struct ActiveSession {
    session: Session,
    last_activity: DateTime<Utc>,
    files: BTreeSet<String>,
    languages: BTreeSet<String>,
}

#[derive(Debug, Clone)]
enum State {
    Idle,
    Active(ActiveSession),
}

/// The segmentation state machine over a storage backend.
///
/// Not internally synchronized: the owner must serialize calls to
/// [`Tracker::on_activity`], [`Tracker::on_idle_check`] and
/// [`Tracker::on_stop`].
#[derive(Debug)]
pub struct Tracker<S, Tz: TimeZone = Local> {
    store: S,
    config: TrackerConfig,
    tz: Tz,
    state: State,
}

impl<S> Tracker<S, Local>
where
    S: Collection<Session> + Collection<Event> + Collection<Aggregate>,
{
    /// Creates an idle tracker that keys aggregates by local date.
    pub const fn new(store: S, config: TrackerConfig) -> Self {
        Self::with_timezone(store, config, Local)
    }
}

impl<S, Tz> Tracker<S, Tz>
where
    S: Collection<Session> + Collection<Event> + Collection<Aggregate>,
    Tz: TimeZone,
{
    /// Creates an idle tracker that keys aggregates by date in `tz`.
    pub const fn with_timezone(store: S, config: TrackerConfig, tz: Tz) -> Self {
        Self {
            store,
            config,
            tz,
            state: State::Idle,
        }
    }

    pub const fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    /// The open session, if any.
    pub const fn active_session(&self) -> Option<&Session> {
        match &self.state {
            State::Active(active) => Some(&active.session),
            State::Idle => None,
        }
    }

    /// Time of the last recorded touch in the open session.
    pub const fn last_activity(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            State::Active(active) => Some(active.last_activity),
            State::Idle => None,
        }
    }

    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Records a touch of `path` at `now`, opening a session if idle.
    ///
    /// Returns the stored event.
    pub fn on_activity(&mut self, path: &Path, now: DateTime<Utc>) -> Result<Event, Error> {
        let mut active = match std::mem::replace(&mut self.state, State::Idle) {
            State::Active(active) => active,
            State::Idle => self.open_session(now)?,
        };

        let event = self.event_for(path, now, &active.session.session_id);
        if let Err(err) = Collection::<Event>::append(&mut self.store, &event) {
            // The session start is durable, so the tracker stays active.
            self.state = State::Active(active);
            return Err(err.into());
        }

        active.last_activity = active.last_activity.max(now);
        active.files.insert(event.file_path.clone());
        active.languages.insert(event.language.clone());
        self.state = State::Active(active);
        tracing::debug!(
            session_id = %event.session_id,
            file = %event.file_path,
            language = %event.language,
            "activity recorded"
        );
        Ok(event)
    }

    /// Closes the open session if the gap since its last touch exceeds the
    /// idle threshold.
    ///
    /// Returns the closed session, or `None` if nothing closed.
    pub fn on_idle_check(&mut self, now: DateTime<Utc>) -> Result<Option<Session>, Error> {
        let Some(last_activity) = self.last_activity() else {
            return Ok(None);
        };
        let idle_ms = (now - last_activity).num_milliseconds();
        if idle_ms <= self.config.idle_threshold_ms {
            return Ok(None);
        }
        tracing::debug!(idle_ms, "idle threshold exceeded");
        self.close_active()
    }

    /// Closes the open session at its last touch, regardless of idleness.
    ///
    /// Used on shutdown so no session stays open across a restart.
    pub fn on_stop(&mut self, now: DateTime<Utc>) -> Result<Option<Session>, Error> {
        tracing::debug!(%now, active = self.is_active(), "stopping tracker");
        self.close_active()
    }

    /// Closes sessions left open by a previous run that never stopped.
    ///
    /// Each orphan ends at its last stored event (or its start if it has
    /// none). Must be called while idle, before the first activity.
    pub fn close_orphaned_sessions(&mut self) -> Result<Vec<Session>, Error> {
        debug_assert!(!self.is_active(), "orphans are closed before tracking");
        let orphans = Collection::<Session>::find(&self.store, &SessionFilter::Open)?;
        let mut closed = Vec::with_capacity(orphans.len());

        for orphan in orphans {
            let events = Collection::<Event>::find(
                &self.store,
                &EventFilter::Session(orphan.session_id.clone()),
            )?;
            let end = events
                .iter()
                .map(|e| e.timestamp)
                .max()
                .unwrap_or(orphan.start_timestamp);
            let files: BTreeSet<_> = events.iter().map(|e| e.file_path.clone()).collect();
            let languages: BTreeSet<_> = events.iter().map(|e| e.language.clone()).collect();

            let session = self.close_session(&orphan, end)?;
            tracing::warn!(session_id = %session.session_id, "closed orphaned session");
            self.roll_up(&session, &files, &languages);
            closed.push(session);
        }

        Ok(closed)
    }

    fn open_session(&mut self, now: DateTime<Utc>) -> Result<ActiveSession, Error> {
        let session = Session::open(SessionId::generate(), now);
        Collection::<Session>::append(&mut self.store, &session)?;
        tracing::info!(session_id = %session.session_id, start = %now, "session opened");
        Ok(ActiveSession {
            session,
            last_activity: now,
            files: BTreeSet::new(),
            languages: BTreeSet::new(),
        })
    }

    fn event_for(&self, path: &Path, now: DateTime<Utc>, session_id: &SessionId) -> Event {
        let file = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Event {
            timestamp: now,
            file_path: file.to_string_lossy().into_owned(),
            language: detect_language(&file).to_string(),
            project: resolve_project_root(&file, &self.config.directories)
                .to_string_lossy()
                .into_owned(),
            session_id: session_id.clone(),
        }
    }

    /// Closes the open session at its last touch and rolls it up.
    ///
    /// On a failed write the session stays open so a later call can retry.
    fn close_active(&mut self) -> Result<Option<Session>, Error> {
        let State::Active(active) = std::mem::replace(&mut self.state, State::Idle) else {
            return Ok(None);
        };
        let session = match self.close_session(&active.session, active.last_activity) {
            Ok(session) => session,
            Err(err) => {
                self.state = State::Active(active);
                return Err(err);
            }
        };
        tracing::info!(
            session_id = %session.session_id,
            duration_ms = session.duration_ms,
            "session closed"
        );
        self.roll_up(&session, &active.files, &active.languages);
        Ok(Some(session))
    }

    /// Persists the close of `session` at `end` and returns the closed record.
    fn close_session(&mut self, session: &Session, end: DateTime<Utc>) -> Result<Session, Error> {
        let patch = session.close_at(end);
        Collection::<Session>::update_matching(
            &mut self.store,
            &SessionFilter::Id(session.session_id.clone()),
            &patch,
        )?;
        let mut closed = session.clone();
        closed.apply(&patch);
        Ok(closed)
    }

    /// Adds a closed session to its end date's aggregate.
    ///
    /// Failures are logged and dropped; summaries never read aggregates.
    fn roll_up(
        &mut self,
        session: &Session,
        files: &BTreeSet<String>,
        languages: &BTreeSet<String>,
    ) {
        let Some(end) = session.end_timestamp else {
            return;
        };
        let date = date_key(end, &self.tz);
        if let Err(err) = self.try_roll_up(date, session.duration_ms, files, languages) {
            tracing::warn!(%date, error = %err, "failed to update daily aggregate");
        }
    }

    fn try_roll_up(
        &mut self,
        date: chrono::NaiveDate,
        duration_ms: i64,
        files: &BTreeSet<String>,
        languages: &BTreeSet<String>,
    ) -> Result<(), StoreError> {
        let existing = Collection::<Aggregate>::find(&self.store, &date)?;
        if let Some(aggregate) = existing.first() {
            let patch = aggregate.rolled_up(duration_ms, files, languages);
            Collection::<Aggregate>::update_matching(&mut self.store, &date, &patch)?;
        } else {
            let mut aggregate = Aggregate::new(date);
            aggregate.total_time_ms = duration_ms;
            aggregate.files_edited.clone_from(files);
            aggregate.languages_used.clone_from(languages);
            Collection::<Aggregate>::append(&mut self.store, &aggregate)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, NaiveDate};

    const MIN: i64 = 60_000;

    fn ts(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, hour, min, 0).unwrap()
    }

    fn tracker(idle_minutes: u32) -> Tracker<MemoryStore, Utc> {
        let config = TrackerConfig::new(idle_minutes, vec![PathBuf::from("/work/app")]);
        Tracker::with_timezone(MemoryStore::new(), config, Utc)
    }

    /// Store whose writes can be made to fail per collection.
    #[derive(Debug, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_sessions: bool,
        fail_events: bool,
        fail_aggregates: bool,
    }

    fn check(fail: bool, collection: &'static str, op: &'static str) -> Result<(), StoreError> {
        if fail {
            Err(StoreError::new(collection, op, "injected failure"))
        } else {
            Ok(())
        }
    }

    macro_rules! flaky_collection {
        ($record:ty, $flag:ident) => {
            impl Collection<$record> for FlakyStore {
                fn append(&mut self, record: &$record) -> Result<(), StoreError> {
                    check(self.$flag, <$record>::COLLECTION, "append")?;
                    Collection::<$record>::append(&mut self.inner, record)
                }

                fn get_all(&self) -> Result<Vec<$record>, StoreError> {
                    Collection::<$record>::get_all(&self.inner)
                }

                fn update_matching(
                    &mut self,
                    filter: &<$record as Record>::Filter,
                    patch: &<$record as Record>::Patch,
                ) -> Result<usize, StoreError> {
                    check(self.$flag, <$record>::COLLECTION, "update")?;
                    Collection::<$record>::update_matching(&mut self.inner, filter, patch)
                }
            }
        };
    }

    flaky_collection!(Session, fail_sessions);
    flaky_collection!(Event, fail_events);
    flaky_collection!(Aggregate, fail_aggregates);

    fn flaky_tracker() -> Tracker<FlakyStore, Utc> {
        let config = TrackerConfig::new(30, vec![PathBuf::from("/work/app")]);
        Tracker::with_timezone(FlakyStore::default(), config, Utc)
    }

    #[test]
    fn test_first_activity_opens_session_and_records_event() {
        let mut tracker = tracker(30);

        let event = tracker
            .on_activity(Path::new("/work/app/src/main.ts"), ts(10, 0))
            .unwrap();

        assert!(tracker.is_active());
        assert_eq!(tracker.last_activity(), Some(ts(10, 0)));
        assert_eq!(event.language, "TypeScript");
        assert_eq!(event.project, "/work/app");
        assert_eq!(event.file_path, "/work/app/src/main.ts");

        let store = tracker.store();
        assert_eq!(store.sessions.len(), 1);
        let session = &store.sessions.records()[0];
        assert!(session.is_open());
        assert_eq!(session.start_timestamp, ts(10, 0));
        assert_eq!(session.duration_ms, 0);
        assert_eq!(event.session_id, session.session_id);
    }

    #[test]
    fn test_activity_while_active_reuses_session() {
        let mut tracker = tracker(30);
        let first = tracker.on_activity(Path::new("/work/app/a.rs"), ts(10, 0)).unwrap();
        let second = tracker.on_activity(Path::new("/work/app/b.rs"), ts(10, 5)).unwrap();

        assert_eq!(first.session_id, second.session_id);
        assert_eq!(tracker.last_activity(), Some(ts(10, 5)));
        assert_eq!(tracker.store().sessions.len(), 1);
        assert_eq!(tracker.store().events.len(), 2);
    }

    #[test]
    fn test_untracked_path_resolves_to_parent_directory() {
        let mut tracker = tracker(30);
        let event = tracker
            .on_activity(Path::new("/tmp/scratch/notes.md"), ts(10, 0))
            .unwrap();
        assert_eq!(event.project, "/tmp/scratch");
        assert_eq!(event.language, "Markdown");
    }

    #[test]
    fn test_idle_check_is_noop_within_threshold() {
        let mut tracker = tracker(30);
        tracker.on_activity(Path::new("/work/app/a.rs"), ts(10, 0)).unwrap();

        assert!(tracker.on_idle_check(ts(10, 15)).unwrap().is_none());
        // Exactly at the threshold is not idle yet.
        assert!(tracker.on_idle_check(ts(10, 30)).unwrap().is_none());
        assert!(tracker.is_active());
        assert!(tracker.store().sessions.records()[0].is_open());
    }

    #[test]
    fn test_idle_check_while_idle_is_noop() {
        let mut tracker = tracker(30);
        assert!(tracker.on_idle_check(ts(12, 0)).unwrap().is_none());
        assert!(tracker.store().sessions.is_empty());
    }

    #[test]
    fn test_idle_check_closes_at_last_activity() {
        let mut tracker = tracker(30);
        tracker.on_activity(Path::new("/work/app/a.rs"), ts(10, 0)).unwrap();
        tracker.on_activity(Path::new("/work/app/b.rs"), ts(10, 20)).unwrap();

        let closed = tracker
            .on_idle_check(ts(10, 50) + Duration::milliseconds(1))
            .unwrap()
            .expect("session should close");

        assert!(!tracker.is_active());
        assert_eq!(closed.end_timestamp, Some(ts(10, 20)));
        assert_eq!(closed.duration_ms, 20 * MIN);
        assert_eq!(tracker.store().sessions.records()[0], closed);
    }

    #[test]
    fn test_closed_duration_is_independent_of_check_delay() {
        let mut early = tracker(30);
        let mut late = tracker(30);
        for t in [&mut early, &mut late] {
            t.on_activity(Path::new("/work/app/a.rs"), ts(9, 0)).unwrap();
            t.on_activity(Path::new("/work/app/a.rs"), ts(9, 40)).unwrap();
        }

        let a = early.on_idle_check(ts(10, 11)).unwrap().unwrap();
        let b = late.on_idle_check(ts(18, 0)).unwrap().unwrap();
        assert_eq!(a.duration_ms, b.duration_ms);
        assert_eq!(a.duration_ms, 40 * MIN);
    }

    #[test]
    fn test_activity_after_close_opens_new_session() {
        let mut tracker = tracker(30);
        let first = tracker.on_activity(Path::new("/work/app/a.rs"), ts(10, 0)).unwrap();
        tracker.on_idle_check(ts(11, 0)).unwrap();
        let second = tracker.on_activity(Path::new("/work/app/a.rs"), ts(11, 5)).unwrap();

        assert_ne!(first.session_id, second.session_id);
        let sessions = tracker.store().sessions.records();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions.iter().filter(|s| s.is_open()).count(), 1);
    }

    #[test]
    fn test_stop_closes_regardless_of_idleness() {
        let mut tracker = tracker(30);
        tracker.on_activity(Path::new("/work/app/a.rs"), ts(10, 0)).unwrap();
        tracker.on_activity(Path::new("/work/app/a.rs"), ts(10, 10)).unwrap();

        let closed = tracker.on_stop(ts(10, 11)).unwrap().unwrap();
        assert_eq!(closed.end_timestamp, Some(ts(10, 10)));
        assert_eq!(closed.duration_ms, 10 * MIN);
        assert!(!tracker.is_active());

        assert!(tracker.on_stop(ts(10, 12)).unwrap().is_none());
    }

    #[test]
    fn test_single_touch_session_has_zero_duration() {
        let mut tracker = tracker(2);
        tracker.on_activity(Path::new("/work/app/a.rs"), ts(10, 0)).unwrap();
        let closed = tracker.on_idle_check(ts(10, 3)).unwrap().unwrap();
        assert_eq!(closed.duration_ms, 0);
        assert_eq!(closed.end_timestamp, Some(closed.start_timestamp));
    }

    #[test]
    fn test_close_creates_then_extends_daily_aggregate() {
        let mut tracker = tracker(30);
        tracker.on_activity(Path::new("/work/app/a.rs"), ts(9, 0)).unwrap();
        tracker.on_activity(Path::new("/work/app/b.ts"), ts(9, 10)).unwrap();
        tracker.on_idle_check(ts(10, 0)).unwrap();

        tracker.on_activity(Path::new("/work/app/c.py"), ts(14, 0)).unwrap();
        tracker.on_activity(Path::new("/work/app/c.py"), ts(14, 5)).unwrap();
        tracker.on_stop(ts(14, 6)).unwrap();

        let aggregates = tracker.store().aggregates.records();
        assert_eq!(aggregates.len(), 1);
        let day = &aggregates[0];
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        assert_eq!(day.total_time_ms, 15 * MIN);
        assert_eq!(day.files_edited.len(), 3);
        let languages: Vec<_> = day.languages_used.iter().map(String::as_str).collect();
        assert_eq!(languages, ["Python", "Rust", "TypeScript"]);
    }

    #[test]
    fn test_aggregate_keyed_by_end_date() {
        let mut tracker = tracker(30);
        tracker.on_activity(Path::new("/work/app/a.rs"), ts(23, 50)).unwrap();
        let next_day = ts(23, 50) + Duration::minutes(20);
        tracker.on_activity(Path::new("/work/app/a.rs"), next_day).unwrap();
        tracker.on_stop(next_day).unwrap();

        let aggregates = tracker.store().aggregates.records();
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].date, NaiveDate::from_ymd_opt(2025, 1, 16).unwrap());
        assert_eq!(aggregates[0].total_time_ms, 20 * MIN);
    }

    #[test]
    fn test_failed_session_write_stays_idle() {
        let mut tracker = flaky_tracker();
        tracker.store.fail_sessions = true;

        let result = tracker.on_activity(Path::new("/work/app/a.rs"), ts(10, 0));

        assert!(matches!(result, Err(Error::Persistence(_))));
        assert!(!tracker.is_active());
        assert!(tracker.store.inner.events.is_empty());
    }

    #[test]
    fn test_failed_event_write_does_not_advance_last_activity() {
        let mut tracker = flaky_tracker();
        tracker.on_activity(Path::new("/work/app/a.rs"), ts(10, 0)).unwrap();

        tracker.store.fail_events = true;
        let result = tracker.on_activity(Path::new("/work/app/a.rs"), ts(10, 20));
        assert!(result.is_err());
        assert_eq!(tracker.last_activity(), Some(ts(10, 0)));

        // Redelivery after recovery records the touch normally.
        tracker.store.fail_events = false;
        tracker.on_activity(Path::new("/work/app/a.rs"), ts(10, 20)).unwrap();
        assert_eq!(tracker.last_activity(), Some(ts(10, 20)));
        assert_eq!(tracker.store.inner.sessions.len(), 1);
    }

    #[test]
    fn test_failed_close_keeps_session_active_for_retry() {
        let mut tracker = flaky_tracker();
        tracker.on_activity(Path::new("/work/app/a.rs"), ts(10, 0)).unwrap();

        tracker.store.fail_sessions = true;
        assert!(tracker.on_idle_check(ts(11, 0)).is_err());
        assert!(tracker.is_active());

        tracker.store.fail_sessions = false;
        let closed = tracker.on_idle_check(ts(11, 1)).unwrap().unwrap();
        assert_eq!(closed.end_timestamp, Some(ts(10, 0)));
    }

    #[test]
    fn test_failed_aggregate_write_still_closes_session() {
        let mut tracker = flaky_tracker();
        tracker.on_activity(Path::new("/work/app/a.rs"), ts(10, 0)).unwrap();
        tracker.on_activity(Path::new("/work/app/a.rs"), ts(10, 5)).unwrap();

        tracker.store.fail_aggregates = true;
        let closed = tracker.on_stop(ts(10, 6)).unwrap().unwrap();

        assert!(!tracker.is_active());
        assert_eq!(closed.duration_ms, 5 * MIN);
        assert!(tracker.store.inner.aggregates.is_empty());
    }

    #[test]
    fn test_orphaned_sessions_close_at_last_event() {
        let mut store = MemoryStore::new();
        let orphan = Session::open(SessionId::new("orphan").unwrap(), ts(8, 0));
        Collection::<Session>::append(&mut store, &orphan).unwrap();
        for (min, file) in [(0, "/work/app/a.rs"), (25, "/work/app/b.go")] {
            let event = Event {
                timestamp: ts(8, min),
                file_path: file.to_string(),
                language: detect_language(Path::new(file)).to_string(),
                project: "/work/app".to_string(),
                session_id: orphan.session_id.clone(),
            };
            Collection::<Event>::append(&mut store, &event).unwrap();
        }
        let config = TrackerConfig::new(30, vec![]);
        let mut tracker = Tracker::with_timezone(store, config, Utc);

        let closed = tracker.close_orphaned_sessions().unwrap();

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].end_timestamp, Some(ts(8, 25)));
        assert_eq!(closed[0].duration_ms, 25 * MIN);
        let store = tracker.into_store();
        assert!(store.sessions.records().iter().all(|s| !s.is_open()));
        assert_eq!(store.aggregates.records()[0].total_time_ms, 25 * MIN);
        assert_eq!(store.aggregates.records()[0].languages_used.len(), 2);
    }
}
