//! Narrow storage contract for the three record collections.
//!
//! The tracker and the range adapter only ever append, read everything, or
//! patch the records matching a filter. Each record type names its own
//! filter and patch types, so a backend binds the operations to concrete
//! columns while [`MemoryCollection`] can evaluate them directly.

use std::convert::Infallible;
use std::error::Error as StdError;

use thiserror::Error;

/// A storage failure, tagged with the collection and operation that failed.
#[derive(Debug, Error)]
#[error("{operation} on {collection} failed")]
pub struct StoreError {
    /// Collection name (e.g., `sessions`).
    pub collection: &'static str,
    /// Operation name (`append`, `read`, or `update`).
    pub operation: &'static str,
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

impl StoreError {
    pub fn new(
        collection: &'static str,
        operation: &'static str,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            collection,
            operation,
            source: source.into(),
        }
    }
}

/// A record that lives in a [`Collection`].
pub trait Record: Clone {
    /// Name of the collection holding this record type.
    const COLLECTION: &'static str;

    /// Selects records for [`Collection::find`] and [`Collection::update_matching`].
    type Filter;

    /// Describes an in-place update.
    type Patch;

    /// Returns whether this record is selected by `filter`.
    fn matches(&self, filter: &Self::Filter) -> bool;

    /// Applies `patch`, returning whether the record changed.
    fn apply(&mut self, patch: &Self::Patch) -> bool;
}

/// Append, bulk read, and predicate-based update over one record type.
///
/// There are no transactional guarantees across calls.
pub trait Collection<R: Record> {
    /// Appends a record.
    fn append(&mut self, record: &R) -> Result<(), StoreError>;

    /// Returns every stored record in insertion order.
    fn get_all(&self) -> Result<Vec<R>, StoreError>;

    /// Applies `patch` to every record matching `filter`.
    ///
    /// Returns the number of records that changed.
    fn update_matching(
        &mut self,
        filter: &R::Filter,
        patch: &R::Patch,
    ) -> Result<usize, StoreError>;

    /// Returns the records matching `filter`.
    fn find(&self, filter: &R::Filter) -> Result<Vec<R>, StoreError> {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|record| record.matches(filter))
            .collect())
    }
}

/// Patch type for records that can never be updated.
pub type Immutable = Infallible;

/// In-memory [`Collection`] backed by a `Vec`.
#[derive(Debug, Clone)]
pub struct MemoryCollection<R> {
    records: Vec<R>,
}

impl<R> Default for MemoryCollection<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<R> MemoryCollection<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }
}

impl<R: Record> Collection<R> for MemoryCollection<R> {
    fn append(&mut self, record: &R) -> Result<(), StoreError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<R>, StoreError> {
        Ok(self.records.clone())
    }

    fn update_matching(
        &mut self,
        filter: &R::Filter,
        patch: &R::Patch,
    ) -> Result<usize, StoreError> {
        let mut changed = 0;
        for record in self.records.iter_mut().filter(|r| r.matches(filter)) {
            if record.apply(patch) {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

/// The three collections the tracker writes, held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub sessions: MemoryCollection<crate::Session>,
    pub events: MemoryCollection<crate::Event>,
    pub aggregates: MemoryCollection<crate::Aggregate>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

macro_rules! delegate_collection {
    ($record:ty, $field:ident) => {
        impl Collection<$record> for MemoryStore {
            fn append(&mut self, record: &$record) -> Result<(), StoreError> {
                self.$field.append(record)
            }

            fn get_all(&self) -> Result<Vec<$record>, StoreError> {
                self.$field.get_all()
            }

            fn update_matching(
                &mut self,
                filter: &<$record as Record>::Filter,
                patch: &<$record as Record>::Patch,
            ) -> Result<usize, StoreError> {
                self.$field.update_matching(filter, patch)
            }
        }
    };
}

delegate_collection!(crate::Session, sessions);
delegate_collection!(crate::Event, events);
delegate_collection!(crate::Aggregate, aggregates);
