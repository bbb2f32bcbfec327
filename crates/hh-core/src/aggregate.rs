//! Per-day rollups written when sessions close.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::Record;

/// Denormalized per-day totals, keyed by the local calendar date a session
/// ended on.
///
/// This is a write-side cache; summaries are always recomputed from events
/// and sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub date: NaiveDate,
    #[serde(default)]
    pub total_time_ms: i64,
    #[serde(default)]
    pub files_edited: BTreeSet<String>,
    #[serde(default)]
    pub languages_used: BTreeSet<String>,
}

impl Aggregate {
    pub const fn new(date: NaiveDate) -> Self {
        Self {
            date,
            total_time_ms: 0,
            files_edited: BTreeSet::new(),
            languages_used: BTreeSet::new(),
        }
    }

    /// Returns the patch that adds a closed session's time and touched sets.
    pub fn rolled_up(
        &self,
        duration_ms: i64,
        files: &BTreeSet<String>,
        languages: &BTreeSet<String>,
    ) -> AggregatePatch {
        AggregatePatch {
            total_time_ms: self.total_time_ms + duration_ms,
            files_edited: self.files_edited.union(files).cloned().collect(),
            languages_used: self.languages_used.union(languages).cloned().collect(),
        }
    }
}

/// Replaces the running totals of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatePatch {
    pub total_time_ms: i64,
    pub files_edited: BTreeSet<String>,
    pub languages_used: BTreeSet<String>,
}

impl Record for Aggregate {
    const COLLECTION: &'static str = "aggregates";
    type Filter = NaiveDate;
    type Patch = AggregatePatch;

    fn matches(&self, filter: &Self::Filter) -> bool {
        self.date == *filter
    }

    fn apply(&mut self, patch: &Self::Patch) -> bool {
        self.total_time_ms = patch.total_time_ms;
        self.files_edited.clone_from(&patch.files_edited);
        self.languages_used.clone_from(&patch.languages_used);
        true
    }
}
