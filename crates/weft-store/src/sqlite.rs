use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};

use crate::{CacheEntry, CacheStore, EntryStatus, Error};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
  cache_key TEXT PRIMARY KEY NOT NULL,
  status TEXT NOT NULL,
  outputs TEXT NOT NULL,
  created_at TEXT NOT NULL
)
"#;

#[derive(FromRow)]
struct CacheRow {
  cache_key: String,
  status: EntryStatus,
  outputs: String,
  created_at: DateTime<Utc>,
}

/// SQLite-based cache store. Survives process restarts.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database file at `path` and ensure the
  /// schema exists.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
    let options = SqliteConnectOptions::new()
      .filename(path.as_ref())
      .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
      .max_connections(4)
      .connect_with(options)
      .await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Create the cache table if it does not exist.
  pub async fn migrate(&self) -> Result<(), Error> {
    sqlx::query(SCHEMA).execute(&self.pool).await?;
    Ok(())
  }
}

#[async_trait]
impl CacheStore for SqliteStore {
  async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
    let row: Option<CacheRow> = sqlx::query_as(
      r#"
      SELECT cache_key, status, outputs, created_at
      FROM cache_entries
      WHERE cache_key = ?
      "#,
    )
    .bind(key)
    .fetch_optional(&self.pool)
    .await?;

    let Some(row) = row else {
      return Ok(None);
    };

    let outputs = serde_json::from_str(&row.outputs).map_err(|source| Error::Corrupt {
      key: row.cache_key.clone(),
      source,
    })?;

    Ok(Some(CacheEntry {
      key: row.cache_key,
      status: row.status,
      outputs,
      created_at: row.created_at,
    }))
  }

  async fn put(&self, entry: &CacheEntry) -> Result<(), Error> {
    sqlx::query(
      r#"
      INSERT OR REPLACE INTO cache_entries (cache_key, status, outputs, created_at)
      VALUES (?, ?, ?, ?)
      "#,
    )
    .bind(&entry.key)
    .bind(entry.status)
    .bind(Json(&entry.outputs))
    .bind(entry.created_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn remove(&self, key: &str) -> Result<bool, Error> {
    let result = sqlx::query("DELETE FROM cache_entries WHERE cache_key = ?")
      .bind(key)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }
}
