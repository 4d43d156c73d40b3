use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use hns_scout_core::PartitionKey;

use crate::{PartitionBackend, StoreError};

/// Keeps partitions in a single SQLite table, one row per key.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Connects and applies the embedded migrations under `migrations/`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StoreError::Connect)?;

        sqlx::query("PRAGMA busy_timeout = 5000;")
            .execute(&pool)
            .await?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .map_err(StoreError::Migration)?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl PartitionBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn read(&self, key: &PartitionKey) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT body FROM partitions WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get("body")))
    }

    async fn write(&self, key: &PartitionKey, body: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO partitions (key, body, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        )
        .bind(key.as_str())
        .bind(body)
        .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<PartitionKey>, StoreError> {
        let rows = sqlx::query("SELECT key FROM partitions ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| PartitionKey::new(row.get::<String, _>("key")).ok())
            .collect())
    }
}
