use async_trait::async_trait;

use crate::TransactionError;

/// The storage collaborator that opens and finishes transactions.
///
/// Implementations hand out opaque transaction handles. Repositories thread
/// the handle through every read and write so that all operations of one
/// unit of work share the same atomic scope.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// The opaque transaction handle.
    type Transaction: Send;

    /// Opens a new transaction.
    ///
    /// Fails when the store cannot provide one, e.g. because its connection
    /// pool is exhausted.
    async fn begin(&self) -> Result<Self::Transaction, TransactionError>;

    /// Commits the transaction, consuming the handle.
    async fn commit(&self, transaction: Self::Transaction) -> Result<(), TransactionError>;

    /// Aborts the transaction and releases its resources.
    ///
    /// Callers treat this as best effort.
    async fn rollback(&self, transaction: Self::Transaction) -> Result<(), TransactionError>;
}
