use crate::db::models::KeyValueRow;
use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Small key/value store persisted in SQLite.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn init(database_url: &str) -> Result<Self> {
        // Every connection to `:memory:` opens its own empty database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS key_value_store (\
                key TEXT PRIMARY KEY,\
                value TEXT NOT NULL,\
                updated_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        info!("Database ready");
        Ok(Database { pool })
    }

    pub async fn get_row(&self, key: &str) -> Result<Option<KeyValueRow>> {
        let row = sqlx::query_as::<_, KeyValueRow>(
            "SELECT key, value, updated_at FROM key_value_store WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_row(key).await?.map(|row| row.value))
    }

    /// Writes `value` only when `key` has never been stored. Returns whether
    /// a row was inserted.
    pub async fn insert_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO key_value_store (key, value, updated_at) VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        let inserted = result.rows_affected() > 0;
        debug!(key = key, inserted = inserted, "insert_if_absent");
        Ok(inserted)
    }

    pub async fn put_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO key_value_store (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        debug!(key = key, "put_value");
        Ok(())
    }
}
