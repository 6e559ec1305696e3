//! Storage configuration loaded from environment variables.

use std::time::Duration;

/// Connection and transaction limits for a store.
///
/// Reads from environment variables:
/// - `STORE_MAX_OPEN_TRANSACTIONS`: concurrent transactions (default: `16`)
/// - `STORE_ACQUIRE_TIMEOUT_SECS`: wait for a free connection (default: `5`)
/// - `DATABASE_URL`: PostgreSQL connection string (default: unset)
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub max_open_transactions: usize,
    pub acquire_timeout: Duration,
    pub database_url: Option<String>,
}

impl StoreConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_open_transactions: std::env::var("STORE_MAX_OPEN_TRANSACTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_open_transactions),
            acquire_timeout: std::env::var("STORE_ACQUIRE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }

    /// Returns a copy limited to `max` concurrent transactions.
    pub fn with_max_open_transactions(mut self, max: usize) -> Self {
        self.max_open_transactions = max;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_open_transactions: 16,
            acquire_timeout: Duration::from_secs(5),
            database_url: None,
        }
    }
}
