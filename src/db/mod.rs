//! PostgreSQL pool and row decoding helpers

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::time::Duration;

use crate::config::PoolConfig;
use crate::store::StoreError;

/// PostgreSQL database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open the pool and verify it with one round trip
    ///
    /// Every in-flight transfer holds one connection from lock to commit,
    /// so `max_connections` bounds the number of concurrent transfers.
    pub async fn connect(database_url: &str, settings: &PoolConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_millis(settings.acquire_timeout_ms))
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.health_check().await?;
        tracing::info!(
            max_connections = settings.max_connections,
            "PostgreSQL connection pool established"
        );
        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Column access that turns a bad value into [`StoreError::CorruptRow`]
pub trait RowExt {
    fn column<'r, T>(&'r self, table: &str, column: &str) -> Result<T, StoreError>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>;
}

impl RowExt for PgRow {
    fn column<'r, T>(&'r self, table: &str, column: &str) -> Result<T, StoreError>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        use sqlx::Row;
        self.try_get(column).map_err(|e| {
            tracing::error!(table, column, error = %e, "Failed to decode column");
            StoreError::CorruptRow(format!("{table}.{column}"))
        })
    }
}
