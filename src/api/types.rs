//! Serde types shared between the backend client and the cache.
//!
//! Records are kept as loose JSON objects; the dashboard only ever reads a
//! handful of id fields out of them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A single row as delivered by the backend.
pub type Record = serde_json::Map<String, Value>;

/// Identifier of a backend entity.
///
/// The backend is inconsistent about sending ids as numbers or strings, so
/// both are accepted and normalized to their decimal/string form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(String);

impl EntityId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Extract an id from a JSON value.
  ///
  /// Numbers and non-empty strings are ids; objects are searched for an
  /// `id` field (foreign keys are sometimes expanded inline). Anything else,
  /// including null, yields `None`.
  pub fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Number(n) => Some(Self(n.to_string())),
      Value::String(s) => {
        let s = s.trim();
        if s.is_empty() {
          None
        } else {
          Some(Self(s.to_string()))
        }
      }
      Value::Object(obj) => obj.get("id").and_then(Self::from_value),
      _ => None,
    }
  }
}

impl fmt::Display for EntityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<i64> for EntityId {
  fn from(id: i64) -> Self {
    Self(id.to_string())
  }
}

impl From<&str> for EntityId {
  fn from(id: &str) -> Self {
    Self(id.to_string())
  }
}

impl Serialize for EntityId {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.0)
  }
}

impl<'de> Deserialize<'de> for EntityId {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Self::from_value(&value)
      .ok_or_else(|| serde::de::Error::custom(format!("invalid entity id: {}", value)))
  }
}

/// Paginated list response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Page {
  #[serde(default)]
  pub results: Vec<Record>,
  #[serde(default)]
  pub count: u64,
}

/// Query parameters for a collection listing.
///
/// Kept ordered so that the same effective query always renders the same
/// query string and the same cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
  pub page: Option<u32>,
  pub filters: BTreeMap<String, String>,
}

impl ListParams {
  pub fn page(page: u32) -> Self {
    Self {
      page: Some(page),
      filters: BTreeMap::new(),
    }
  }

  pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.filters.insert(key.into(), value.into());
    self
  }

  /// Query pairs in a stable order, page first.
  pub fn pairs(&self) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(self.filters.len() + 1);
    if let Some(page) = self.page {
      pairs.push(("page".to_string(), page.to_string()));
    }
    pairs.extend(self.filters.iter().map(|(k, v)| (k.clone(), v.clone())));
    pairs
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_id_from_number_and_string() {
    assert_eq!(EntityId::from_value(&json!(42)), Some(EntityId::from(42)));
    assert_eq!(EntityId::from_value(&json!("42")), Some(EntityId::from(42)));
    assert_eq!(EntityId::from_value(&json!(" 7 ")), Some(EntityId::from(7)));
  }

  #[test]
  fn test_id_from_nested_object() {
    let value = json!({ "id": 5, "name": "Centre A" });
    assert_eq!(EntityId::from_value(&value), Some(EntityId::from(5)));
  }

  #[test]
  fn test_id_rejects_empty_values() {
    assert_eq!(EntityId::from_value(&Value::Null), None);
    assert_eq!(EntityId::from_value(&json!("")), None);
    assert_eq!(EntityId::from_value(&json!({})), None);
    assert_eq!(EntityId::from_value(&json!([1, 2])), None);
  }

  #[test]
  fn test_id_deserializes_from_either_shape() {
    let ids: Vec<EntityId> = serde_json::from_value(json!([1, "2"])).unwrap();
    assert_eq!(ids, vec![EntityId::from(1), EntityId::from(2)]);
    assert_eq!(serde_json::to_value(&ids[0]).unwrap(), json!("1"));
  }

  #[test]
  fn test_list_params_pairs_are_ordered() {
    let params = ListParams::page(2)
      .filter("status", "open")
      .filter("block", "42");
    assert_eq!(
      params.pairs(),
      vec![
        ("page".to_string(), "2".to_string()),
        ("block".to_string(), "42".to_string()),
        ("status".to_string(), "open".to_string()),
      ]
    );
  }
}
