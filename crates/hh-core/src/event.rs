//! Observed file touches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Immutable, Record};
use crate::time::TimeRange;
use crate::types::SessionId;

/// One observed file touch, attributed to the session that was open.
///
/// Events are immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// When the file was touched.
    pub timestamp: DateTime<Utc>,
    /// Absolute path of the touched file.
    pub file_path: String,
    /// Language tag derived from the file extension.
    pub language: String,
    /// Tracked directory root (or containing directory) of the file.
    pub project: String,
    /// The session that was open when the touch was observed.
    pub session_id: SessionId,
}

/// Selects events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Events attributed to the given session.
    Session(SessionId),
    /// Events stamped inside the range, inclusive at both ends.
    Within(TimeRange),
}

impl Record for Event {
    const COLLECTION: &'static str = "events";
    type Filter = EventFilter;
    type Patch = Immutable;

    fn matches(&self, filter: &Self::Filter) -> bool {
        match filter {
            EventFilter::Session(id) => self.session_id == *id,
            EventFilter::Within(range) => range.contains(self.timestamp),
        }
    }

    fn apply(&mut self, patch: &Self::Patch) -> bool {
        match *patch {}
    }
}
