//! Error types for almanac-core

use thiserror::Error;

use crate::models::EntityKind;

/// Result type alias using almanac-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in almanac-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("{kind} entity not found: {id}")]
    NotFound {
        /// Kind of the missing entity
        kind: EntityKind,
        /// Requested id
        id: String,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A full sync of one or more entity kinds failed
    #[error("Sync failed: {0}")]
    Sync(String),
}
