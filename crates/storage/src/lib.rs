pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod transaction;

pub use common::AggregateId;
pub use config::StoreConfig;
pub use error::{Result, StorageError, TransactionError};
pub use memory::{InMemoryStore, InMemoryTransaction, StoreStats};
pub use postgres::PostgresTransactionManager;
pub use transaction::TransactionManager;
