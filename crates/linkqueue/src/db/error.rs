use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create database directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Schema upgrade `version` could not be applied.
    #[error("Migration {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored job, config or metrics payload is not valid JSON for its type.
    #[error("Corrupt stored payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}
