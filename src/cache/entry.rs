//! Envelope stored under every cache key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Advisory tags recorded alongside a payload (requesting user, role).
/// Never consulted when deciding whether an entry is usable.
pub type CacheMeta = BTreeMap<String, String>;

/// A cached payload and when it was written.
///
/// Entries are only ever replaced wholesale. There is no expiry: an entry
/// stays until it is overwritten by a forced fetch or invalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
  pub written_at: DateTime<Utc>,
  pub payload: T,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub meta: CacheMeta,
}

impl<T> CacheEntry<T> {
  pub fn new(payload: T, meta: CacheMeta) -> Self {
    Self {
      written_at: Utc::now(),
      payload,
      meta,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::{json, Value};

  #[test]
  fn test_wire_shape() {
    let mut meta = CacheMeta::new();
    meta.insert("role".to_string(), "bmmu".to_string());
    let entry = CacheEntry::new(json!([{ "id": 1 }]), meta);

    let value = serde_json::to_value(&entry).unwrap();
    assert!(value.get("writtenAt").is_some());
    assert_eq!(value["payload"], json!([{ "id": 1 }]));
    assert_eq!(value["meta"]["role"], json!("bmmu"));
  }

  #[test]
  fn test_meta_is_optional_on_read() {
    let entry: CacheEntry<Value> = serde_json::from_value(json!({
      "writtenAt": "2024-05-01T10:00:00Z",
      "payload": { "id": 3 },
    }))
    .unwrap();
    assert!(entry.meta.is_empty());
    assert_eq!(entry.payload, json!({ "id": 3 }));
  }
}
