use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Failed to open database at {path}: {source}")]
    Connection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Constraint violation: {0}")]
    Integrity(String),

    #[error("{entity} #{id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{entity} references missing {parent} #{id}")]
    Referential {
        entity: &'static str,
        parent: &'static str,
        id: i64,
    },

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Unknown event type '{0}'")]
    InvalidEventType(String),

    #[error("Unknown status '{0}'")]
    InvalidStatus(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database not initialized. Run 'apptrack init' first.")]
    NotInitialized,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl TrackerError {
    /// True for any primary-key/unique/check/foreign-key failure raised by SQLite.
    pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }

    /// Converts a store error raised while writing a child row of `parent #id`.
    /// Foreign-key failures become `Referential`, other constraint failures
    /// become `Integrity`.
    pub(crate) fn from_write(
        err: rusqlite::Error,
        entity: &'static str,
        parent: &'static str,
        id: i64,
    ) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                TrackerError::Referential { entity, parent, id }
            }
            _ if Self::is_constraint_violation(&err) => TrackerError::Integrity(err.to_string()),
            _ => TrackerError::Sqlite(err),
        }
    }
}

pub type Result<T, E = TrackerError> = std::result::Result<T, E>;
