//! Store Errors
//!
//! Error types for connection registry and unit-of-work operations.

/// Errors that can occur while opening or using a store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying SQLite file could not be opened
    #[error("Failed to open store '{name}': {source}")]
    Open {
        name: String,
        #[source]
        source: sqlx::Error,
    },

    /// A statement failed; the unit of work that ran it has been rolled back
    #[error("Statement failed ({statement}): {source}")]
    Statement {
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    /// The unit of work was already committed or rolled back
    #[error("Unit of work on store '{0}' is already closed")]
    ScopeClosed(String),

    /// Store names must map onto a single file inside the data folder
    #[error("Invalid store name: {0:?}")]
    InvalidStoreName(String),
}
