//! SQLite-backed offline store.
//!
//! The connection is opened on first use and shared for the rest of the
//! process. Every operation runs the blocking SQLite call on tokio's blocking
//! pool and is its own transaction; nothing here spans several operations.

pub mod schema;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

use crate::error::{OfflineError, Result};
use crate::model::{CacheEntry, ExtractionStatus, NewExtraction, OfflineExtraction, PendingRequest};

use schema::{SCHEMA, SCHEMA_VERSION};

/// Where the store lives.
#[derive(Debug, Clone)]
pub enum StoreLocation {
  File(PathBuf),
  /// Private in-memory database, gone when the store is dropped
  Memory,
}

pub struct OfflineStore {
  location: StoreLocation,
  conn: OnceCell<Arc<Mutex<Connection>>>,
}

impl OfflineStore {
  /// Create a handle. Nothing is opened until the first operation.
  pub fn new(location: StoreLocation) -> Self {
    Self {
      location,
      conn: OnceCell::new(),
    }
  }

  pub fn in_memory() -> Self {
    Self::new(StoreLocation::Memory)
  }

  /// Whether the connection has been opened successfully.
  pub fn is_open(&self) -> bool {
    self.conn.initialized()
  }

  async fn connection(&self) -> Result<Arc<Mutex<Connection>>> {
    let conn = self
      .conn
      .get_or_try_init(|| {
        let location = self.location.clone();
        async move {
          let conn = tokio::task::spawn_blocking(move || open_connection(&location)).await??;
          Ok::<_, OfflineError>(Arc::new(Mutex::new(conn)))
        }
      })
      .await?;

    Ok(Arc::clone(conn))
  }

  /// Run `f` against the connection on the blocking pool.
  async fn with_conn<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    let conn = self.connection().await?;
    tokio::task::spawn_blocking(move || {
      let conn = conn
        .lock()
        .map_err(|e| OfflineError::StoreUnavailable(format!("Lock poisoned: {}", e)))?;
      f(&conn)
    })
    .await?
  }

  // ==========================================================================
  // Pending requests
  // ==========================================================================

  pub async fn insert_pending(
    &self,
    kind: &str,
    payload: &Value,
    endpoint: &str,
    timestamp: i64,
  ) -> Result<i64> {
    let kind = kind.to_string();
    let endpoint = endpoint.to_string();
    let payload = serde_json::to_string(payload)?;

    self
      .with_conn(move |conn| {
        conn.execute(
          "INSERT INTO pending (kind, payload, endpoint, timestamp, retries)
           VALUES (?, ?, ?, ?, 0)",
          params![kind, payload, endpoint, timestamp],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await
  }

  /// All pending requests in insertion order.
  pub async fn pending(&self) -> Result<Vec<PendingRequest>> {
    self
      .with_conn(|conn| {
        let mut stmt = conn.prepare(
          "SELECT id, kind, payload, endpoint, timestamp, retries
           FROM pending ORDER BY id",
        )?;

        let rows = stmt
          .query_map([], |row| {
            Ok((
              row.get::<_, i64>(0)?,
              row.get::<_, String>(1)?,
              row.get::<_, String>(2)?,
              row.get::<_, String>(3)?,
              row.get::<_, i64>(4)?,
              row.get::<_, u32>(5)?,
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        rows
          .into_iter()
          .map(|(id, kind, payload, endpoint, timestamp, retries)| -> Result<PendingRequest> {
            Ok(PendingRequest {
              id,
              kind,
              payload: serde_json::from_str(&payload)?,
              endpoint,
              timestamp,
              retries,
            })
          })
          .collect()
      })
      .await
  }

  pub async fn count_pending(&self) -> Result<u64> {
    self
      .with_conn(|conn| {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM pending", [], |row| row.get(0))?;
        Ok(count as u64)
      })
      .await
  }

  pub async fn update_pending_retries(&self, id: i64, retries: u32) -> Result<()> {
    self
      .with_conn(move |conn| {
        conn.execute(
          "UPDATE pending SET retries = ? WHERE id = ?",
          params![retries, id],
        )?;
        Ok(())
      })
      .await
  }

  pub async fn delete_pending(&self, id: i64) -> Result<()> {
    self
      .with_conn(move |conn| {
        conn.execute("DELETE FROM pending WHERE id = ?", params![id])?;
        Ok(())
      })
      .await
  }

  // ==========================================================================
  // Cache entries
  // ==========================================================================

  /// Insert or overwrite the entry for `entry.key`.
  pub async fn put_cache(&self, entry: &CacheEntry) -> Result<()> {
    let key = entry.key.clone();
    let value = serde_json::to_string(&entry.value)?;
    let timestamp = entry.timestamp;
    let expires = entry.expires;

    self
      .with_conn(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO cache (key, value, timestamp, expires)
           VALUES (?, ?, ?, ?)",
          params![key, value, timestamp, expires],
        )?;
        Ok(())
      })
      .await
  }

  /// Raw lookup, expired or not.
  pub async fn get_cache(&self, key: &str) -> Result<Option<CacheEntry>> {
    let key = key.to_string();

    self
      .with_conn(move |conn| {
        let row: Option<(String, i64, i64)> = conn
          .query_row(
            "SELECT value, timestamp, expires FROM cache WHERE key = ?",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
          )
          .optional()?;

        match row {
          Some((value, timestamp, expires)) => Ok(Some(CacheEntry {
            key,
            value: serde_json::from_str(&value)?,
            timestamp,
            expires,
          })),
          None => Ok(None),
        }
      })
      .await
  }

  pub async fn delete_cache(&self, key: &str) -> Result<()> {
    let key = key.to_string();

    self
      .with_conn(move |conn| {
        conn.execute("DELETE FROM cache WHERE key = ?", params![key])?;
        Ok(())
      })
      .await
  }

  pub async fn count_cache(&self) -> Result<u64> {
    self
      .with_conn(|conn| {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        Ok(count as u64)
      })
      .await
  }

  // ==========================================================================
  // Offline extractions
  // ==========================================================================

  pub async fn insert_extraction(&self, extraction: NewExtraction) -> Result<i64> {
    let result = extraction
      .result
      .as_ref()
      .map(serde_json::to_string)
      .transpose()?;

    self
      .with_conn(move |conn| {
        conn.execute(
          "INSERT INTO extractions (filename, file_data, file_type, result, timestamp, status, synced)
           VALUES (?, ?, ?, ?, ?, ?, 0)",
          params![
            extraction.filename,
            extraction.file_data,
            extraction.file_type,
            result,
            extraction.timestamp,
            ExtractionStatus::Offline.as_str(),
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await
  }

  pub async fn extractions(&self) -> Result<Vec<OfflineExtraction>> {
    self
      .with_conn(|conn| {
        let mut stmt = conn.prepare(
          "SELECT id, filename, file_data, file_type, result, timestamp, status, synced
           FROM extractions ORDER BY id",
        )?;

        #[allow(clippy::type_complexity)]
        let rows: Vec<(i64, String, String, String, Option<String>, i64, String, bool)> = stmt
          .query_map([], |row| {
            Ok((
              row.get(0)?,
              row.get(1)?,
              row.get(2)?,
              row.get(3)?,
              row.get(4)?,
              row.get(5)?,
              row.get(6)?,
              row.get(7)?,
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        rows
          .into_iter()
          .map(
            |(id, filename, file_data, file_type, result, timestamp, status, synced)| -> Result<OfflineExtraction> {
              let status = ExtractionStatus::parse(&status).ok_or_else(|| {
                OfflineError::Corrupt(format!(
                  "Unknown extraction status '{}' for record {}",
                  status, id
                ))
              })?;
              Ok(OfflineExtraction {
                id,
                filename,
                file_data,
                file_type,
                result: result.as_deref().map(serde_json::from_str).transpose()?,
                timestamp,
                status,
                synced,
              })
            },
          )
          .collect()
      })
      .await
  }

  /// Run raw SQL against the store.
  #[cfg(test)]
  pub(crate) async fn execute_batch(&self, sql: &str) -> Result<()> {
    let sql = sql.to_string();
    self
      .with_conn(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await
  }
}

fn open_connection(location: &StoreLocation) -> Result<Connection> {
  let conn = match location {
    StoreLocation::File(path) => {
      // Ensure parent directory exists
      if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
          OfflineError::StoreUnavailable(format!("Failed to create store directory: {}", e))
        })?;
      }

      Connection::open(path).map_err(|e| {
        OfflineError::StoreUnavailable(format!(
          "Failed to open store at {}: {}",
          path.display(),
          e
        ))
      })?
    }
    StoreLocation::Memory => Connection::open_in_memory()
      .map_err(|e| OfflineError::StoreUnavailable(format!("Failed to open store: {}", e)))?,
  };

  run_migrations(&conn)?;
  Ok(conn)
}

/// Create tables and record the schema version.
fn run_migrations(conn: &Connection) -> Result<()> {
  let version: i32 = conn
    .pragma_query_value(None, "user_version", |row| row.get(0))
    .map_err(|e| OfflineError::StoreUnavailable(format!("Failed to read schema version: {}", e)))?;

  if version > SCHEMA_VERSION {
    return Err(OfflineError::StoreUnavailable(format!(
      "Store schema version {} is newer than supported version {}",
      version, SCHEMA_VERSION
    )));
  }

  if version < SCHEMA_VERSION {
    conn
      .execute_batch(SCHEMA)
      .map_err(|e| OfflineError::StoreUnavailable(format!("Failed to run migrations: {}", e)))?;
    conn
      .pragma_update(None, "user_version", SCHEMA_VERSION)
      .map_err(|e| {
        OfflineError::StoreUnavailable(format!("Failed to record schema version: {}", e))
      })?;
    tracing::info!(version = SCHEMA_VERSION, "initialized offline store schema");
  }

  Ok(())
}

/// A location whose parent is a regular file, so opening always fails.
#[cfg(test)]
pub(crate) fn unopenable_location() -> StoreLocation {
  let blocker = std::env::temp_dir().join(format!("factosync-blocker-{}", std::process::id()));
  std::fs::write(&blocker, b"").unwrap();
  StoreLocation::File(blocker.join("offline.db"))
}
