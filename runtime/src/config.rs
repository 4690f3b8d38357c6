//! Configuration loaded from environment variables with defaults.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceConfig {
    /// Transaction retry settings.
    pub transactions: TransactionConfig,
    /// `PostgreSQL` settings; `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    /// `tracing` filter directive.
    pub log_filter: String,
}

/// Transaction retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Retries after the first attempt.
    pub max_retries: usize,
    /// First backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds.
    pub max_delay_ms: u64,
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay_ms: 10,
            max_delay_ms: 500,
        }
    }
}

impl Default for ConferenceConfig {
    fn default() -> Self {
        Self {
            transactions: TransactionConfig::default(),
            database: None,
            log_filter: "info,conference_runtime=debug".to_string(),
        }
    }
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ConferenceConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = TransactionConfig::default();
        Self {
            transactions: TransactionConfig {
                max_retries: parsed("CONFERENCE_TX_MAX_RETRIES", defaults.max_retries),
                initial_delay_ms: parsed("CONFERENCE_TX_INITIAL_DELAY_MS", defaults.initial_delay_ms),
                max_delay_ms: parsed("CONFERENCE_TX_MAX_DELAY_MS", defaults.max_delay_ms),
            },
            database: env::var("DATABASE_URL").ok().map(|url| DatabaseConfig {
                url,
                max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10),
                connect_timeout: parsed("DATABASE_CONNECT_TIMEOUT", 30),
            }),
            log_filter: env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,conference_runtime=debug".to_string()),
        }
    }

    /// Retry policy for read-modify-write transactions.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.transactions.max_retries)
            .initial_delay(Duration::from_millis(self.transactions.initial_delay_ms))
            .max_delay(Duration::from_millis(self.transactions.max_delay_ms))
            .build()
    }
}
