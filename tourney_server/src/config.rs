//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};
use tourney::{
    db::DatabaseConfig,
    scheduler::{STATUS_SCHEDULER_LOCK_ID, SchedulerConfig},
};

/// Default HTTP bind address
pub const DEFAULT_BIND: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
    8080,
);

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP bind address
    pub bind: SocketAddr,
    /// Database pool configuration
    pub database: DatabaseConfig,
    /// Status scheduler interval and advisory lock key
    pub scheduler: SchedulerConfig,
    /// Prometheus scrape address; metrics are disabled when unset
    pub metrics_bind: Option<SocketAddr>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// CLI overrides win over `SERVER_BIND` and `DATABASE_URL`. Unparseable
    /// numeric values fall back to their defaults; an unparseable
    /// `METRICS_BIND` is an error.
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = bind_override
            .or_else(|| {
                std::env::var("SERVER_BIND")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or(DEFAULT_BIND);

        let defaults = DatabaseConfig::development();
        let database = DatabaseConfig {
            database_url: database_url_override
                .or_else(|| std::env::var("DATABASE_URL").ok())
                .unwrap_or(defaults.database_url),
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", defaults.min_connections),
            connection_timeout_secs: parse_env_or(
                "DB_CONNECTION_TIMEOUT_SECS",
                defaults.connection_timeout_secs,
            ),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME_SECS", defaults.max_lifetime_secs),
        };

        let scheduler = SchedulerConfig {
            interval: Duration::from_secs(parse_env_or("SCHEDULER_INTERVAL_SECS", 30)),
            lock_id: parse_env_or("SCHEDULER_LOCK_ID", STATUS_SCHEDULER_LOCK_ID),
        };

        let metrics_bind = match std::env::var("METRICS_BIND") {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    var: "METRICS_BIND".to_string(),
                    reason: format!("'{raw}' is not a socket address"),
                })?)
            }
            _ => None,
        };

        Ok(ServerConfig {
            bind,
            database,
            scheduler,
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "SCHEDULER_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        if self.database.database_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                var: "DATABASE_URL".to_string(),
                hint: "e.g. postgres://postgres@localhost/tourney".to_string(),
            });
        }

        if self.metrics_bind == Some(self.bind) {
            return Err(ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("Must differ from the server bind address ({})", self.bind),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
