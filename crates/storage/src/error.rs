use thiserror::Error;

use crate::AggregateId;

/// Errors raised while opening, committing or rolling back a transaction.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// No transaction could be opened because every slot is in use.
    #[error("No transaction available: all {limit} transaction slots are in use")]
    Exhausted { limit: usize },

    /// The transaction handle was requested before the transaction was opened.
    #[error("Transaction has not been started")]
    NotStarted,

    /// A second transaction was requested on a scope that already holds one.
    #[error("Transaction already started")]
    AlreadyStarted,

    /// The transaction was already committed or rolled back.
    #[error("Transaction already finished")]
    Finished,

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors raised by repository operations running inside a transaction.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested record does not exist.
    #[error("{collection} not found: {id}")]
    NotFound { collection: String, id: AggregateId },

    /// The caller passed an argument the operation cannot work with.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The store is not configured well enough to connect.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The surrounding transaction failed or is unusable.
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Builds a `NotFound` error for the given collection and id.
    pub fn not_found(collection: impl Into<String>, id: AggregateId) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id,
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
