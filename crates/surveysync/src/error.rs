//! Error types for surveysync.
//!
//! Three classes matter to callers: network failures (transient, always
//! downgraded to local queuing), persistence failures (the survey could not
//! be saved anywhere) and parse failures (a malformed payload at the
//! serialization boundary). Everything else is infrastructure.

use std::path::PathBuf;
use thiserror::Error;

use crate::endpoint::DeliveryError;

/// The main error type for surveysync operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Pipeline Errors ===
    /// A delivery attempt did not reach or was rejected by the endpoint.
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// The local store could not accept a survey. The survey is lost.
    #[error("survey could not be saved locally: {source}")]
    PersistenceFailure {
        /// The storage error that caused the loss.
        #[source]
        source: Box<Error>,
    },

    /// A payload was malformed at the serialization boundary.
    #[error("malformed survey payload: {message}")]
    ParseFailure {
        /// Description of what was wrong with the payload.
        message: String,
    },

    /// Required answers were left blank.
    #[error("survey is missing required answers: {}", missing.join(", "))]
    IncompleteSurvey {
        /// Names of the unanswered fields, in the order they were required.
        missing: Vec<String>,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for surveysync operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new parse failure.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseFailure {
            message: message.into(),
        }
    }

    /// Wrap a storage error as a persistence failure.
    #[must_use]
    pub fn persistence(source: Self) -> Self {
        Self::PersistenceFailure {
            source: Box::new(source),
        }
    }

    /// Check if this error is a transient network failure.
    #[must_use]
    pub fn is_network_failure(&self) -> bool {
        matches!(self, Self::Delivery(_))
    }

    /// Check if this error means a survey could not be persisted.
    #[must_use]
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Self::PersistenceFailure { .. })
    }

    /// Check if this error is a malformed payload.
    #[must_use]
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, Self::ParseFailure { .. })
    }

    /// Check if this error is a survey with unanswered required fields.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::IncompleteSurvey { .. })
    }
}
