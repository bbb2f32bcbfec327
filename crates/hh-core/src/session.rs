//! Contiguous spans of coding activity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::range::session_overlaps;
use crate::store::Record;
use crate::time::TimeRange;
use crate::types::SessionId;

/// A contiguous span of activity bounded by idle gaps.
///
/// `end_timestamp` is `None` while the session is open. Once set it is never
/// revised, and `duration_ms` is `end - start` floored at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub start_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: i64,
}

impl Session {
    /// Creates an open session starting at `start`.
    pub const fn open(session_id: SessionId, start: DateTime<Utc>) -> Self {
        Self {
            session_id,
            start_timestamp: start,
            end_timestamp: None,
            duration_ms: 0,
        }
    }

    pub const fn is_open(&self) -> bool {
        self.end_timestamp.is_none()
    }

    /// The closing patch for this session ending at `end`.
    ///
    /// An `end` before the start collapses to the start.
    pub fn close_at(&self, end: DateTime<Utc>) -> SessionPatch {
        let end = end.max(self.start_timestamp);
        SessionPatch::Close {
            end_timestamp: end,
            duration_ms: (end - self.start_timestamp).num_milliseconds(),
        }
    }
}

/// Selects sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFilter {
    /// The session with this ID.
    Id(SessionId),
    /// Every session that has not been closed.
    Open,
    /// Sessions overlapping the range. An open session counts as the instant
    /// it started.
    Overlapping(TimeRange),
}

/// Updates a session in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPatch {
    /// Sets the end and duration. Ignored for sessions that are already closed.
    Close {
        end_timestamp: DateTime<Utc>,
        duration_ms: i64,
    },
}

impl Record for Session {
    const COLLECTION: &'static str = "sessions";
    type Filter = SessionFilter;
    type Patch = SessionPatch;

    fn matches(&self, filter: &Self::Filter) -> bool {
        match filter {
            SessionFilter::Id(id) => self.session_id == *id,
            SessionFilter::Open => self.is_open(),
            SessionFilter::Overlapping(range) => session_overlaps(self, range),
        }
    }

    fn apply(&mut self, patch: &Self::Patch) -> bool {
        match *patch {
            SessionPatch::Close {
                end_timestamp,
                duration_ms,
            } => {
                if !self.is_open() {
                    return false;
                }
                self.end_timestamp = Some(end_timestamp);
                self.duration_ms = duration_ms;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, hour, min, 0).unwrap()
    }

    #[test]
    fn close_sets_end_and_duration() {
        let mut session = Session::open(SessionId::new("s1").unwrap(), ts(10, 0));
        assert!(session.is_open());

        let patch = session.close_at(ts(10, 45));
        assert!(session.apply(&patch));

        assert_eq!(session.end_timestamp, Some(ts(10, 45)));
        assert_eq!(session.duration_ms, 45 * 60 * 1000);
    }

    #[test]
    fn close_before_start_floors_duration_at_zero() {
        let session = Session::open(SessionId::new("s1").unwrap(), ts(10, 0));
        let SessionPatch::Close {
            end_timestamp,
            duration_ms,
        } = session.close_at(ts(9, 0));
        assert_eq!(end_timestamp, ts(10, 0));
        assert_eq!(duration_ms, 0);
    }

    #[test]
    fn closed_session_end_is_never_revised() {
        let mut session = Session::open(SessionId::new("s1").unwrap(), ts(10, 0));
        let first = session.close_at(ts(11, 0));
        assert!(session.apply(&first));

        let second = session.close_at(ts(12, 0));
        assert!(!session.apply(&second));
        assert_eq!(session.end_timestamp, Some(ts(11, 0)));
        assert_eq!(session.duration_ms, 60 * 60 * 1000);
    }

    #[test]
    fn open_filter_selects_unclosed_sessions() {
        let open = Session::open(SessionId::new("open").unwrap(), ts(10, 0));
        let mut closed = Session::open(SessionId::new("closed").unwrap(), ts(8, 0));
        closed.apply(&closed.close_at(ts(9, 0)));

        assert!(open.matches(&SessionFilter::Open));
        assert!(!closed.matches(&SessionFilter::Open));
        assert!(closed.matches(&SessionFilter::Id(SessionId::new("closed").unwrap())));
    }

    #[test]
    fn overlapping_filter_treats_open_session_as_its_start() {
        let range = TimeRange::new(ts(10, 0), ts(12, 0)).unwrap();
        let early_open = Session::open(SessionId::new("a").unwrap(), ts(9, 0));
        let late_open = Session::open(SessionId::new("b").unwrap(), ts(11, 0));
        let mut spanning = Session::open(SessionId::new("c").unwrap(), ts(9, 0));
        spanning.apply(&spanning.close_at(ts(10, 0)));

        let filter = SessionFilter::Overlapping(range);
        assert!(!early_open.matches(&filter));
        assert!(late_open.matches(&filter));
        assert!(spanning.matches(&filter));
    }
}
