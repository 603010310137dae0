//! Storage layer: PostgreSQL pool, store traits and their implementations.
//!
//! The core services are generic over [`TournamentStore`]. Production uses
//! [`PgStore`]; tests use the in-memory store behind the `test-util` feature.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::{sync::Arc, time::Duration};

pub mod config;
#[cfg(any(test, feature = "test-util"))]
pub mod fixtures;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod postgres;
pub mod queries;
pub mod repository;

pub use config::DatabaseConfig;
#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryStore, MemoryTx};
pub use postgres::{PgStore, PgTx};
pub use repository::{StoreTx, TournamentStore};

/// Schema migrations, applied with `MIGRATOR.run(&pool)`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,
}

impl Database {
    /// Create a new database connection pool
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tourney::db::{Database, DatabaseConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), sqlx::Error> {
    ///     let db = Database::new(&DatabaseConfig::development()).await?;
    ///     db.health_check().await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(self.pool.as_ref()).await
    }

    /// Store sharing this pool
    pub fn store(&self) -> PgStore {
        PgStore::new(Arc::clone(&self.pool))
    }

    /// Check if the database connection is healthy
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(self.pool.as_ref()).await?;
        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}
