//! Core domain logic for hackhours.
//!
//! This crate contains the fundamental types and logic for:
//! - Segmentation: turning file touches into sessions split by idle gaps
//! - Summaries: crediting time to files, languages, projects, days and hours
//! - Storage contract: the narrow collection interface backends implement

mod aggregate;
mod error;
mod event;
pub mod language;
pub mod project;
pub mod range;
mod session;
pub mod store;
pub mod summary;
pub mod time;
pub mod tracker;
pub mod types;

pub use aggregate::{Aggregate, AggregatePatch};
pub use error::Error;
pub use event::{Event, EventFilter};
pub use session::{Session, SessionFilter, SessionPatch};
pub use store::{Collection, MemoryCollection, MemoryStore, Record, StoreError};
pub use summary::{Summary, build_summary, summarize, summarize_in};
pub use time::{Period, TimeRange};
pub use tracker::{Tracker, TrackerConfig};
pub use types::{SessionId, ValidationError};
