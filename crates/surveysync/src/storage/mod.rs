//! Durable local store for pending submissions.
//!
//! Surveys that could not be delivered are appended here and stay until the
//! sync engine gets an acknowledgement for them. Presence in the store is the
//! only "pending" marker: rows are deleted on success, never updated.

pub mod migrations;
mod queue;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::payload::SerializedPayload;

pub use queue::PendingQueue;

/// A survey awaiting delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubmission {
    /// Local surrogate key. Monotonic per device, never sent to the server.
    pub id: i64,
    /// The opaque serialized survey.
    pub payload: SerializedPayload,
    /// BLAKE3 digest of `payload`, computed when the row was added.
    pub digest: String,
    /// When the first delivery attempt failed (or was skipped while offline).
    pub enqueued_at: DateTime<Utc>,
    /// Always `false` while the row exists.
    pub synced: bool,
}

/// Statistics about the pending queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Number of surveys awaiting delivery.
    pub pending: u64,
    /// Enqueue time of the oldest pending survey.
    pub oldest: Option<DateTime<Utc>>,
    /// Enqueue time of the newest pending survey.
    pub newest: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// A persistent, ordered collection of pending submissions.
///
/// Implementations must survive process restarts and must treat removal of a
/// missing id as a no-op, since overlapping sync passes may race to remove
/// the same record.
pub trait KeyedDurableStore: Send {
    /// Append a new record and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error only when the underlying storage refuses the write.
    fn add(&self, payload: &SerializedPayload) -> Result<i64>;

    /// Delete the record with this id.
    ///
    /// Returns `true` if a record was deleted, `false` if it was already gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn remove(&self, id: i64) -> Result<bool>;

    /// All pending records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn list_all(&self) -> Result<Vec<PendingSubmission>>;

    /// Number of pending records.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn count(&self) -> Result<u64>;

    /// Whether a record with this id is still pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn contains(&self, id: i64) -> Result<bool>;

    /// Queue statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn stats(&self) -> Result<QueueStats>;
}

/// `SQLite`-backed pending-submission store.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a store at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Reopening an existing store keeps every pending record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening pending store at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // FULL sync: a queued survey must survive power loss, not just a crash
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Pending store opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record with an explicit enqueue time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn add_at(&self, payload: &SerializedPayload, enqueued_at: DateTime<Utc>) -> Result<i64> {
        let digest = payload.digest();
        self.conn.execute(
            r"
            INSERT INTO pending_submissions (payload, payload_digest, enqueued_at, synced)
            VALUES (?1, ?2, ?3, 0)
            ",
            params![payload.as_str(), digest, format_timestamp(enqueued_at)],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(id, digest = &digest[..16], "Queued pending submission");
        Ok(id)
    }

    /// Get a pending record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, id: i64) -> Result<Option<PendingSubmission>> {
        let result = self
            .conn
            .query_row(
                r"
                SELECT id, payload, payload_digest, enqueued_at, synced
                FROM pending_submissions WHERE id = ?1
                ",
                [id],
                Self::row_to_pending,
            )
            .optional()?;
        Ok(result)
    }

    fn timestamp_query(&self, sql: &str) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self.conn.query_row(sql, [], |row| row.get(0)).optional()?;
        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    fn row_to_pending(row: &rusqlite::Row) -> rusqlite::Result<PendingSubmission> {
        let id: i64 = row.get(0)?;
        let payload: String = row.get(1)?;
        let digest: String = row.get(2)?;
        let enqueued_at_str: String = row.get(3)?;
        let synced: bool = row.get(4)?;

        let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
            })?;

        Ok(PendingSubmission {
            id,
            payload: SerializedPayload::from_stored(payload),
            digest,
            enqueued_at,
            synced,
        })
    }
}

impl KeyedDurableStore for Storage {
    fn add(&self, payload: &SerializedPayload) -> Result<i64> {
        self.add_at(payload, Utc::now())
    }

    fn remove(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM pending_submissions WHERE id = ?1", [id])?;
        if affected == 0 {
            debug!(id, "Pending submission already removed");
        }
        Ok(affected > 0)
    }

    fn list_all(&self) -> Result<Vec<PendingSubmission>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, payload, payload_digest, enqueued_at, synced
            FROM pending_submissions ORDER BY enqueued_at ASC, id ASC
            ",
        )?;

        let pending = stmt
            .query_map([], Self::row_to_pending)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(pending)
    }

    fn count(&self) -> Result<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM pending_submissions", [], |row| {
                    row.get(0)
                })?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn contains(&self, id: i64) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM pending_submissions WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn stats(&self) -> Result<QueueStats> {
        let pending = self.count()?;
        let oldest = self.timestamp_query(
            "SELECT enqueued_at FROM pending_submissions ORDER BY enqueued_at ASC LIMIT 1",
        )?;
        let newest = self.timestamp_query(
            "SELECT enqueued_at FROM pending_submissions ORDER BY enqueued_at DESC LIMIT 1",
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(QueueStats {
            pending,
            oldest,
            newest,
            db_size_bytes,
        })
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
