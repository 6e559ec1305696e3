use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use crate::{StorageError, StoreConfig, TransactionError, TransactionManager};

/// PostgreSQL-backed transaction manager.
///
/// Every transaction holds one pooled connection until it is committed or
/// rolled back, so the pool size bounds the number of concurrent units of
/// work.
#[derive(Clone)]
pub struct PostgresTransactionManager {
    pool: PgPool,
}

impl PostgresTransactionManager {
    /// Creates a new transaction manager over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool sized from the configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StorageError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StorageError::Configuration("DATABASE_URL is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(u32::try_from(config.max_open_transactions).unwrap_or(u32::MAX))
            .acquire_timeout(config.acquire_timeout)
            .connect(url)
            .await?;

        tracing::info!(
            max_connections = config.max_open_transactions,
            "connected PostgreSQL pool"
        );
        Ok(Self { pool })
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn map_begin_error(&self, error: sqlx::Error) -> TransactionError {
        match error {
            sqlx::Error::PoolTimedOut => TransactionError::Exhausted {
                limit: self.pool.options().get_max_connections() as usize,
            },
            other => TransactionError::Database(other),
        }
    }
}

#[async_trait]
impl TransactionManager for PostgresTransactionManager {
    type Transaction = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Transaction, TransactionError> {
        let transaction = self
            .pool
            .begin()
            .await
            .map_err(|e| self.map_begin_error(e))?;
        tracing::debug!("postgres transaction started");
        Ok(transaction)
    }

    async fn commit(&self, transaction: Self::Transaction) -> Result<(), TransactionError> {
        transaction.commit().await?;
        metrics::counter!("storage_transactions_committed_total").increment(1);
        tracing::debug!("postgres transaction committed");
        Ok(())
    }

    async fn rollback(&self, transaction: Self::Transaction) -> Result<(), TransactionError> {
        transaction.rollback().await?;
        metrics::counter!("storage_transactions_rolled_back_total").increment(1);
        tracing::debug!("postgres transaction rolled back");
        Ok(())
    }
}
