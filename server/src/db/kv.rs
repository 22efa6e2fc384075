//! SQLite-backed key/value store for the offline queue.

use futures::future::BoxFuture;
use sqlx::Row;
use tether_engine::{error::Result, Error, KeyValueStore};

use super::Pool;

/// A [`KeyValueStore`] over the `kv_entries` table.
///
/// Every method is a single statement, so each write is atomic.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn storage_error(op: &'static str, err: sqlx::Error) -> Error {
    tracing::error!(op, error = %err, "kv store query failed");
    Error::Storage(err.to_string())
}

impl KeyValueStore for SqliteStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| storage_error("get", e))?;

            row.map(|r| r.try_get::<String, _>("value"))
                .transpose()
                .map_err(|e| storage_error("get", e))
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO kv_entries (key, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT (key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("set", e))?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM kv_entries WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await
                .map_err(|e| storage_error("delete", e))?;
            Ok(())
        })
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let rows = sqlx::query("SELECT key FROM kv_entries ORDER BY key")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| storage_error("keys", e))?;

            rows.iter()
                .map(|r| r.try_get::<String, _>("key"))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| storage_error("keys", e))
        })
    }
}
