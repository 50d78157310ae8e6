//! Error types for ConceptDB.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    /// A source row's list column could not be decoded.
    #[error("Malformed record in {table} (id={id}): {reason}")]
    MalformedRecord {
        table: String,
        id: i64,
        reason: String,
    },

    /// A required source table is absent. Raised before any write.
    #[error("Missing required table: {0}")]
    MissingTable(String),

    #[error("Identity collision exhaustion for {name:?} after {attempts} attempts")]
    IdentityCollisionExhaustion { name: String, attempts: u32 },

    /// The live table may be gone or stale and must be rebuilt.
    #[error("Partial write failure on table {table}: {reason}. The table must be rebuilt")]
    PartialWriteFailure { table: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
