//! Catalog error types.

use domain::ApplicationError;
use storage::{StorageError, TransactionError};
use thiserror::Error;

use crate::product::{ProductError, ProductId};

/// Errors surfaced by catalog use cases.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Input failed product validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ProductError),

    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A repository operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The application service failed to complete the unit of work.
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl From<TransactionError> for CatalogError {
    fn from(e: TransactionError) -> Self {
        CatalogError::Storage(StorageError::Transaction(e))
    }
}

impl CatalogError {
    /// Returns true if the write went through even though an error is
    /// reported.
    pub fn is_committed(&self) -> bool {
        matches!(self, CatalogError::Application(e) if e.is_post_commit())
    }
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
