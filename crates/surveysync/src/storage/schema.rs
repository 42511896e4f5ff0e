//! `SQLite` schema definitions for the pending-submission store.

/// SQL statement to create the pending submissions table.
///
/// `AUTOINCREMENT` keeps ids monotonic: a deleted id is never handed out
/// again on the same device.
pub const CREATE_PENDING_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS pending_submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    payload_digest TEXT NOT NULL,
    enqueued_at TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
)
";

/// SQL statement to create an index on `enqueued_at` for oldest-first drains.
pub const CREATE_ENQUEUED_AT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_pending_enqueued_at ON pending_submissions(enqueued_at ASC)
";

/// SQL statement to create an index on `payload_digest`.
pub const CREATE_DIGEST_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_pending_digest ON pending_submissions(payload_digest)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_PENDING_TABLE,
    CREATE_ENQUEUED_AT_INDEX,
    CREATE_DIGEST_INDEX,
    CREATE_METADATA_TABLE,
];
