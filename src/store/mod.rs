//! Persistent key-value storage shared by every subsystem.
//!
//! `KeyValueStore` is the only thing the rest of the crate talks to. It
//! never returns an error: a value that cannot be read or decoded is
//! reported as absent, and a write that fails is logged and dropped.

mod sqlite;

pub use sqlite::SqliteBackend;

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Raw storage of string values by key.
pub trait KeyValueBackend: Send + Sync {
  fn read(&self, key: &str) -> Result<Option<String>>;

  fn write(&self, key: &str, value: &str) -> Result<()>;

  fn delete(&self, key: &str) -> Result<()>;

  /// All stored keys starting with `prefix`, in key order.
  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Process-local storage, used in tests and when persistence is disabled.
#[derive(Default)]
pub struct MemoryBackend {
  entries: Mutex<BTreeMap<String, String>>,
}

impl KeyValueBackend for MemoryBackend {
  fn read(&self, key: &str) -> Result<Option<String>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(key).cloned())
  }

  fn write(&self, key: &str, value: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.remove(key);
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      entries
        .keys()
        .filter(|k| k.starts_with(prefix))
        .cloned()
        .collect(),
    )
  }
}

/// JSON view over a `KeyValueBackend`.
///
/// Cheap to clone; all clones share the same backend. Writes are last
/// writer wins per key with no locking across keys.
#[derive(Clone)]
pub struct KeyValueStore {
  backend: Arc<dyn KeyValueBackend>,
}

impl KeyValueStore {
  pub fn new(backend: impl KeyValueBackend + 'static) -> Self {
    Self {
      backend: Arc::new(backend),
    }
  }

  /// A store that lives only as long as the process.
  pub fn in_memory() -> Self {
    Self::new(MemoryBackend::default())
  }

  /// Read and decode the value under `key`.
  ///
  /// Missing keys, backend failures and values that are not valid JSON for
  /// `T` all come back as `None`.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let raw = match self.backend.read(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(key, error = %e, "store read failed");
        return None;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(value) => Some(value),
      Err(e) => {
        warn!(key, error = %e, "ignoring corrupt store entry");
        None
      }
    }
  }

  /// Encode and store `value` under `key`, replacing what was there.
  pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
    let encoded = match serde_json::to_string(value) {
      Ok(encoded) => encoded,
      Err(e) => {
        warn!(key, error = %e, "dropping unserializable store write");
        return;
      }
    };

    if let Err(e) = self.backend.write(key, &encoded) {
      warn!(key, error = %e, "store write failed");
    } else {
      debug!(key, bytes = encoded.len(), "store write");
    }
  }

  /// Store a string verbatim, bypassing JSON encoding.
  pub fn set_raw(&self, key: &str, value: &str) {
    if let Err(e) = self.backend.write(key, value) {
      warn!(key, error = %e, "store write failed");
    }
  }

  pub fn remove(&self, key: &str) {
    if let Err(e) = self.backend.delete(key) {
      warn!(key, error = %e, "store delete failed");
    }
  }

  /// Remove every key starting with `prefix`. Returns how many were removed.
  pub fn clear_prefix(&self, prefix: &str) -> usize {
    let keys = match self.backend.keys_with_prefix(prefix) {
      Ok(keys) => keys,
      Err(e) => {
        warn!(prefix, error = %e, "store key scan failed");
        return 0;
      }
    };

    for key in &keys {
      self.remove(key);
    }
    keys.len()
  }
}
