//! Application configuration loaded from environment variables.

use storage::StoreConfig;

/// Catalog configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `"json"` for JSON logs, anything else for text (default: text)
/// - everything [`StoreConfig::from_env`] reads
///
/// PostgreSQL is used when `DATABASE_URL` is set, the in-memory store otherwise.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub json_logs: bool,
    pub store: StoreConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            json_logs: std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")),
            store: StoreConfig::from_env(),
        }
    }

    /// Returns true if the catalog should persist to PostgreSQL.
    pub fn uses_postgres(&self) -> bool {
        self.store.database_url.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            store: StoreConfig::default(),
        }
    }
}
