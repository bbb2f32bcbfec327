//! Range queries over stored events and sessions.

use crate::event::{Event, EventFilter};
use crate::session::{Session, SessionFilter};
use crate::store::{Collection, StoreError};
use crate::time::TimeRange;

/// Whether a session overlaps the range.
///
/// Open sessions are treated as the single instant they started at, so an
/// open session that started before `from` is excluded.
pub fn session_overlaps(session: &Session, range: &TimeRange) -> bool {
    let end = session.end_timestamp.unwrap_or(session.start_timestamp);
    session.start_timestamp <= range.to && end >= range.from
}

/// Fetches the sessions overlapping `range`, in storage order.
///
/// Backends that index timestamps answer this with a range scan.
pub fn sessions_in_range<C>(store: &C, range: &TimeRange) -> Result<Vec<Session>, StoreError>
where
    C: Collection<Session> + ?Sized,
{
    store.find(&SessionFilter::Overlapping(*range))
}

/// Fetches the events inside `range`, in storage order.
pub fn events_in_range<C>(store: &C, range: &TimeRange) -> Result<Vec<Event>, StoreError>
where
    C: Collection<Event> + ?Sized,
{
    store.find(&EventFilter::Within(*range))
}
