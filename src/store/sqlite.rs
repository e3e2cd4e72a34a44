//! SQLite-backed key-value storage.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::KeyValueBackend;

/// Persistent key-value backend stored in a single SQLite table.
pub struct SqliteBackend {
  conn: Mutex<Connection>,
}

impl SqliteBackend {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the store at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;

    let backend = Self {
      conn: Mutex::new(conn),
    };
    backend.run_migrations()?;

    Ok(backend)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("tmsdash").join("store.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(())
  }
}

const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl KeyValueBackend for SqliteBackend {
  fn read(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key, e))
  }

  fn write(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write {}: {}", key, e))?;

    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete {}: {}", key, e))?;

    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // substr comparison avoids LIKE treating '_' in keys as a wildcard
    let mut stmt = conn
      .prepare("SELECT key FROM kv WHERE substr(key, 1, ?1) = ?2 ORDER BY key")
      .map_err(|e| eyre!("Failed to prepare key scan: {}", e))?;

    let keys = stmt
      .query_map(params![prefix.chars().count() as i64, prefix], |row| {
        row.get(0)
      })
      .map_err(|e| eyre!("Failed to scan keys: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(keys)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn temp_backend() -> (tempfile::TempDir, SqliteBackend) {
    let dir = tempfile::tempdir().unwrap();
    let backend = SqliteBackend::open_at(&dir.path().join("nested").join("store.db")).unwrap();
    (dir, backend)
  }

  #[test]
  fn test_write_read_delete() {
    let (_dir, backend) = temp_backend();

    assert_eq!(backend.read("a").unwrap(), None);
    backend.write("a", "1").unwrap();
    backend.write("a", "2").unwrap();
    assert_eq!(backend.read("a").unwrap().as_deref(), Some("2"));

    backend.delete("a").unwrap();
    assert_eq!(backend.read("a").unwrap(), None);
  }

  #[test]
  fn test_prefix_scan_is_literal() {
    let (_dir, backend) = temp_backend();
    backend.write("batches_cache_v1", "{}").unwrap();
    backend.write("batches_cache_v1_42", "{}").unwrap();
    backend.write("batchesXcache_v1", "{}").unwrap();
    backend.write("centres_cache_v1", "{}").unwrap();

    let keys = backend.keys_with_prefix("batches_cache_v1").unwrap();
    assert_eq!(keys, vec!["batches_cache_v1", "batches_cache_v1_42"]);
  }

  #[test]
  fn test_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    SqliteBackend::open_at(&path)
      .unwrap()
      .write("ps_leftnav_mode", "1")
      .unwrap();

    let reopened = SqliteBackend::open_at(&path).unwrap();
    assert_eq!(
      reopened.read("ps_leftnav_mode").unwrap().as_deref(),
      Some("1")
    );
  }
}
