//! Storage layer for hackhours.
//!
//! Persists sessions, events, and daily aggregates using `rusqlite`, and
//! implements [`hh_core::Collection`] for each so the tracker and the summary
//! engine can run directly against the database.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The daemon keeps its connection inside the single task that owns the tracker;
//! report commands open their own connection. WAL mode lets readers proceed
//! while the daemon writes.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! (e.g., `2025-01-15T10:30:00.000Z`), so lexicographic ordering matches
//! chronological ordering. Aggregate dates are stored as `YYYY-MM-DD`.
//!
//! ## Set Columns
//!
//! `files_edited` and `languages_used` hold JSON arrays of strings in sorted
//! order.
//!
//! ## Insertion Order
//!
//! Reads return rows by `rowid`, which matches append order.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use hh_core::store::Immutable;
use hh_core::time::{format_date_key, parse_date_key};
use hh_core::{
    Aggregate, AggregatePatch, Collection, Event, EventFilter, Record, Session, SessionFilter,
    SessionId, SessionPatch, StoreError, ValidationError,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp in {column}: {value}")]
    TimestampParse {
        column: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    /// Failed to encode or decode a JSON set column.
    #[error("invalid set column: {0}")]
    SetColumn(#[from] serde_json::Error),
    /// A stored ID or date key failed validation.
    #[error("invalid stored value: {0}")]
    InvalidValue(#[from] ValidationError),
}

impl DbError {
    fn in_store(self, collection: &'static str, operation: &'static str) -> StoreError {
        StoreError::new(collection, operation, self)
    }
}

/// Row counts per collection, used by `status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub sessions: u64,
    pub open_sessions: u64,
    pub events: u64,
    pub aggregates: u64,
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        let db = Self { conn };
        db.init()?;
        tracing::debug!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                start_timestamp TEXT NOT NULL,
                end_timestamp TEXT,
                duration_ms INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_start ON sessions(start_timestamp);
            CREATE INDEX IF NOT EXISTS idx_sessions_end ON sessions(end_timestamp);

            -- Events reference sessions by ID without a foreign key: summaries
            -- treat events whose session is missing as belonging to an open one.
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                file_path TEXT NOT NULL,
                language TEXT NOT NULL,
                project TEXT NOT NULL,
                session_id TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id);

            CREATE TABLE IF NOT EXISTS aggregates (
                date TEXT PRIMARY KEY,
                total_time_ms INTEGER NOT NULL DEFAULT 0,
                files_edited TEXT NOT NULL DEFAULT '[]',
                languages_used TEXT NOT NULL DEFAULT '[]'
            );
            ",
        )?;
        Ok(())
    }

    /// Counts rows in each collection.
    pub fn record_counts(&self) -> Result<RecordCounts, DbError> {
        let count = |sql: &str| -> Result<u64, DbError> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };
        Ok(RecordCounts {
            sessions: count("SELECT COUNT(*) FROM sessions")?,
            open_sessions: count("SELECT COUNT(*) FROM sessions WHERE end_timestamp IS NULL")?,
            events: count("SELECT COUNT(*) FROM events")?,
            aggregates: count("SELECT COUNT(*) FROM aggregates")?,
        })
    }

    /// Timestamp of the most recent event, if any.
    pub fn last_event_at(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        let value: Option<String> = self
            .conn
            .query_row("SELECT MAX(timestamp) FROM events", [], |row| row.get(0))
            .optional()?
            .flatten();
        value
            .map(|v| parse_timestamp(&v, "events.timestamp"))
            .transpose()
    }

    fn insert_session(&self, session: &Session) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO sessions (session_id, start_timestamp, end_timestamp, duration_ms)
             VALUES (?, ?, ?, ?)",
            params![
                session.session_id.as_str(),
                format_timestamp(session.start_timestamp),
                session.end_timestamp.map(format_timestamp),
                session.duration_ms,
            ],
        )?;
        Ok(())
    }

    fn select_sessions(&self, filter: Option<&SessionFilter>) -> Result<Vec<Session>, DbError> {
        const COLUMNS: &str = "SELECT session_id, start_timestamp, end_timestamp, duration_ms
             FROM sessions";
        let rows = match filter {
            None => self.query_rows(&format!("{COLUMNS} ORDER BY rowid"), [], session_row)?,
            Some(SessionFilter::Id(id)) => self.query_rows(
                &format!("{COLUMNS} WHERE session_id = ? ORDER BY rowid"),
                [id.as_str()],
                session_row,
            )?,
            Some(SessionFilter::Open) => self.query_rows(
                &format!("{COLUMNS} WHERE end_timestamp IS NULL ORDER BY rowid"),
                [],
                session_row,
            )?,
            // An open session overlaps only if it started inside the range.
            Some(SessionFilter::Overlapping(range)) => self.query_rows(
                &format!(
                    "{COLUMNS} WHERE start_timestamp <= ?2
                       AND (end_timestamp >= ?1
                            OR (end_timestamp IS NULL AND start_timestamp >= ?1))
                     ORDER BY rowid"
                ),
                [format_timestamp(range.from), format_timestamp(range.to)],
                session_row,
            )?,
        };
        rows.into_iter().map(SessionRow::into_session).collect()
    }

    fn close_sessions(&self, filter: &SessionFilter, patch: &SessionPatch) -> Result<usize, DbError> {
        let SessionPatch::Close {
            end_timestamp,
            duration_ms,
        } = *patch;
        let end = format_timestamp(end_timestamp);
        // Closed sessions are never revised, matching `Session::apply`.
        let changed = match filter {
            SessionFilter::Id(id) => self.conn.execute(
                "UPDATE sessions SET end_timestamp = ?, duration_ms = ?
                 WHERE session_id = ? AND end_timestamp IS NULL",
                params![end, duration_ms, id.as_str()],
            )?,
            SessionFilter::Open => self.conn.execute(
                "UPDATE sessions SET end_timestamp = ?, duration_ms = ?
                 WHERE end_timestamp IS NULL",
                params![end, duration_ms],
            )?,
            SessionFilter::Overlapping(range) => self.conn.execute(
                "UPDATE sessions SET end_timestamp = ?1, duration_ms = ?2
                 WHERE end_timestamp IS NULL
                   AND start_timestamp >= ?3 AND start_timestamp <= ?4",
                params![
                    end,
                    duration_ms,
                    format_timestamp(range.from),
                    format_timestamp(range.to)
                ],
            )?,
        };
        Ok(changed)
    }

    fn insert_event(&self, event: &Event) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO events (timestamp, file_path, language, project, session_id)
             VALUES (?, ?, ?, ?, ?)",
            params![
                format_timestamp(event.timestamp),
                event.file_path,
                event.language,
                event.project,
                event.session_id.as_str(),
            ],
        )?;
        Ok(())
    }

    fn select_events(&self, filter: Option<&EventFilter>) -> Result<Vec<Event>, DbError> {
        const COLUMNS: &str = "SELECT timestamp, file_path, language, project, session_id
             FROM events";
        let rows = match filter {
            None => self.query_rows(&format!("{COLUMNS} ORDER BY id"), [], event_row)?,
            Some(EventFilter::Session(id)) => self.query_rows(
                &format!("{COLUMNS} WHERE session_id = ? ORDER BY id"),
                [id.as_str()],
                event_row,
            )?,
            Some(EventFilter::Within(range)) => self.query_rows(
                &format!("{COLUMNS} WHERE timestamp >= ? AND timestamp <= ? ORDER BY id"),
                [format_timestamp(range.from), format_timestamp(range.to)],
                event_row,
            )?,
        };
        rows.into_iter().map(EventRow::into_event).collect()
    }

    fn insert_aggregate(&self, aggregate: &Aggregate) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO aggregates (date, total_time_ms, files_edited, languages_used)
             VALUES (?, ?, ?, ?)",
            params![
                format_date_key(aggregate.date),
                aggregate.total_time_ms,
                serde_json::to_string(&aggregate.files_edited)?,
                serde_json::to_string(&aggregate.languages_used)?,
            ],
        )?;
        Ok(())
    }

    fn select_aggregates(&self, date: Option<NaiveDate>) -> Result<Vec<Aggregate>, DbError> {
        const COLUMNS: &str = "SELECT date, total_time_ms, files_edited, languages_used
             FROM aggregates";
        let rows = match date {
            None => self.query_rows(&format!("{COLUMNS} ORDER BY rowid"), [], aggregate_row)?,
            Some(date) => self.query_rows(
                &format!("{COLUMNS} WHERE date = ?"),
                [format_date_key(date)],
                aggregate_row,
            )?,
        };
        rows.into_iter().map(AggregateRow::into_aggregate).collect()
    }

    fn update_aggregate(&self, date: NaiveDate, patch: &AggregatePatch) -> Result<usize, DbError> {
        let changed = self.conn.execute(
            "UPDATE aggregates SET total_time_ms = ?, files_edited = ?, languages_used = ?
             WHERE date = ?",
            params![
                patch.total_time_ms,
                serde_json::to_string(&patch.files_edited)?,
                serde_json::to_string(&patch.languages_used)?,
                format_date_key(date),
            ],
        )?;
        Ok(changed)
    }

    fn query_rows<T, P>(
        &self,
        sql: &str,
        params: P,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, DbError>
    where
        P: rusqlite::Params,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl Collection<Session> for Database {
    fn append(&mut self, record: &Session) -> Result<(), StoreError> {
        self.insert_session(record)
            .map_err(|e| e.in_store(Session::COLLECTION, "append"))
    }

    fn get_all(&self) -> Result<Vec<Session>, StoreError> {
        self.select_sessions(None)
            .map_err(|e| e.in_store(Session::COLLECTION, "read"))
    }

    fn update_matching(
        &mut self,
        filter: &SessionFilter,
        patch: &SessionPatch,
    ) -> Result<usize, StoreError> {
        self.close_sessions(filter, patch)
            .map_err(|e| e.in_store(Session::COLLECTION, "update"))
    }

    fn find(&self, filter: &SessionFilter) -> Result<Vec<Session>, StoreError> {
        self.select_sessions(Some(filter))
            .map_err(|e| e.in_store(Session::COLLECTION, "read"))
    }
}

impl Collection<Event> for Database {
    fn append(&mut self, record: &Event) -> Result<(), StoreError> {
        self.insert_event(record)
            .map_err(|e| e.in_store(Event::COLLECTION, "append"))
    }

    fn get_all(&self) -> Result<Vec<Event>, StoreError> {
        self.select_events(None)
            .map_err(|e| e.in_store(Event::COLLECTION, "read"))
    }

    fn update_matching(
        &mut self,
        _filter: &EventFilter,
        patch: &Immutable,
    ) -> Result<usize, StoreError> {
        match *patch {}
    }

    fn find(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        self.select_events(Some(filter))
            .map_err(|e| e.in_store(Event::COLLECTION, "read"))
    }
}

impl Collection<Aggregate> for Database {
    fn append(&mut self, record: &Aggregate) -> Result<(), StoreError> {
        self.insert_aggregate(record)
            .map_err(|e| e.in_store(Aggregate::COLLECTION, "append"))
    }

    fn get_all(&self) -> Result<Vec<Aggregate>, StoreError> {
        self.select_aggregates(None)
            .map_err(|e| e.in_store(Aggregate::COLLECTION, "read"))
    }

    fn update_matching(
        &mut self,
        filter: &NaiveDate,
        patch: &AggregatePatch,
    ) -> Result<usize, StoreError> {
        self.update_aggregate(*filter, patch)
            .map_err(|e| e.in_store(Aggregate::COLLECTION, "update"))
    }

    fn find(&self, filter: &NaiveDate) -> Result<Vec<Aggregate>, StoreError> {
        self.select_aggregates(Some(*filter))
            .map_err(|e| e.in_store(Aggregate::COLLECTION, "read"))
    }
}

/// Raw column values; parsed outside the rusqlite row closure so parse
/// failures surface as [`DbError`].
struct SessionRow {
    session_id: String,
    start_timestamp: String,
    end_timestamp: Option<String>,
    duration_ms: i64,
}

fn session_row(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        session_id: row.get(0)?,
        start_timestamp: row.get(1)?,
        end_timestamp: row.get(2)?,
        duration_ms: row.get(3)?,
    })
}

impl SessionRow {
    fn into_session(self) -> Result<Session, DbError> {
        Ok(Session {
            session_id: SessionId::new(self.session_id)?,
            start_timestamp: parse_timestamp(&self.start_timestamp, "sessions.start_timestamp")?,
            end_timestamp: self
                .end_timestamp
                .map(|v| parse_timestamp(&v, "sessions.end_timestamp"))
                .transpose()?,
            duration_ms: self.duration_ms,
        })
    }
}

struct EventRow {
    timestamp: String,
    file_path: String,
    language: String,
    project: String,
    session_id: String,
}

fn event_row(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        timestamp: row.get(0)?,
        file_path: row.get(1)?,
        language: row.get(2)?,
        project: row.get(3)?,
        session_id: row.get(4)?,
    })
}

impl EventRow {
    fn into_event(self) -> Result<Event, DbError> {
        Ok(Event {
            timestamp: parse_timestamp(&self.timestamp, "events.timestamp")?,
            file_path: self.file_path,
            language: self.language,
            project: self.project,
            session_id: SessionId::new(self.session_id)?,
        })
    }
}

struct AggregateRow {
    date: String,
    total_time_ms: i64,
    files_edited: String,
    languages_used: String,
}

fn aggregate_row(row: &Row<'_>) -> rusqlite::Result<AggregateRow> {
    Ok(AggregateRow {
        date: row.get(0)?,
        total_time_ms: row.get(1)?,
        files_edited: row.get(2)?,
        languages_used: row.get(3)?,
    })
}

impl AggregateRow {
    fn into_aggregate(self) -> Result<Aggregate, DbError> {
        Ok(Aggregate {
            date: parse_date_key(&self.date)?,
            total_time_ms: self.total_time_ms,
            files_edited: serde_json::from_str::<BTreeSet<String>>(&self.files_edited)?,
            languages_used: serde_json::from_str::<BTreeSet<String>>(&self.languages_used)?,
        })
    }
}

fn parse_timestamp(value: &str, column: &'static str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            column,
            value: value.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
