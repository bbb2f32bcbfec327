use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::StoreError;

/// Errors from the tracker and the summary engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The query window ends before it starts.
    #[error("invalid range: {from} is after {to}")]
    InvalidRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    /// The idle cap was negative.
    #[error("idle cap must not be negative, got {0}ms")]
    InvalidIdleCap(i64),

    /// A storage read or write failed. Not retried.
    #[error(transparent)]
    Persistence(#[from] StoreError),
}
