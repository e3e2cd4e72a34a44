//! Role normalization.
//!
//! The backend delivers a user's role as a small integer, a free-text name,
//! or a nested `{id, name}` object depending on the endpoint. `RawRole` holds
//! whatever arrived and `normalize_role` turns it into the closed
//! `CanonicalRole` set. Nothing downstream branches on the raw shape.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::api::types::Record;

/// Closed set of roles the dashboard knows how to render for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum CanonicalRole {
  Bmmu,
  Dmmu,
  Dcnrlm,
  Smmu,
  TrainingPartner,
  MasterTrainer,
  CrpEp,
  CrpLd,
  StateAdmin,
  PmuAdmin,
  TpContactPerson,
  #[default]
  Unknown,
}

impl CanonicalRole {
  pub const ALL: [CanonicalRole; 12] = [
    Self::Bmmu,
    Self::Dmmu,
    Self::Dcnrlm,
    Self::Smmu,
    Self::TrainingPartner,
    Self::MasterTrainer,
    Self::CrpEp,
    Self::CrpLd,
    Self::StateAdmin,
    Self::PmuAdmin,
    Self::TpContactPerson,
    Self::Unknown,
  ];

  /// Role key as used by the backend and in persisted cache meta.
  /// `Unknown` is the empty string.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Bmmu => "bmmu",
      Self::Dmmu => "dmmu",
      Self::Dcnrlm => "dcnrlm",
      Self::Smmu => "smmu",
      Self::TrainingPartner => "training_partner",
      Self::MasterTrainer => "master_trainer",
      Self::CrpEp => "crp_ep",
      Self::CrpLd => "crp_ld",
      Self::StateAdmin => "state_admin",
      Self::PmuAdmin => "pmu_admin",
      Self::TpContactPerson => "tp_contact_person",
      Self::Unknown => "",
    }
  }

  pub fn is_known(&self) -> bool {
    *self != Self::Unknown
  }

  fn from_id(id: i64) -> Option<Self> {
    ROLE_IDS
      .iter()
      .find(|(known, _)| *known == id)
      .map(|(_, role)| *role)
  }

  fn from_keywords(text: &str) -> Option<Self> {
    let text = text.trim().to_lowercase().replace([' ', '-'], "_");
    if text.is_empty() {
      return None;
    }
    ROLE_KEYWORDS
      .iter()
      .find(|(keyword, _)| text.contains(keyword))
      .map(|(_, role)| *role)
  }
}

impl fmt::Display for CanonicalRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Backend role table ids.
const ROLE_IDS: &[(i64, CanonicalRole)] = &[
  (1, CanonicalRole::Bmmu),
  (2, CanonicalRole::Dmmu),
  (3, CanonicalRole::Smmu),
  (4, CanonicalRole::TrainingPartner),
  (5, CanonicalRole::MasterTrainer),
  (6, CanonicalRole::CrpEp),
  (7, CanonicalRole::CrpLd),
  (8, CanonicalRole::StateAdmin),
  (9, CanonicalRole::PmuAdmin),
  (10, CanonicalRole::Dcnrlm),
  (11, CanonicalRole::TpContactPerson),
];

/// Substring keywords, checked top to bottom. More specific keywords must
/// come before any keyword they contain or are contained in
/// ("tp_contact" before "partner").
const ROLE_KEYWORDS: &[(&str, CanonicalRole)] = &[
  ("tp_contact", CanonicalRole::TpContactPerson),
  ("contact_person", CanonicalRole::TpContactPerson),
  ("state_admin", CanonicalRole::StateAdmin),
  ("pmu", CanonicalRole::PmuAdmin),
  ("dcnrlm", CanonicalRole::Dcnrlm),
  ("bmmu", CanonicalRole::Bmmu),
  ("dmmu", CanonicalRole::Dmmu),
  ("smmu", CanonicalRole::Smmu),
  ("master_trainer", CanonicalRole::MasterTrainer),
  ("crp_ep", CanonicalRole::CrpEp),
  ("crp_ld", CanonicalRole::CrpLd),
  ("training_partner", CanonicalRole::TrainingPartner),
  ("partner", CanonicalRole::TrainingPartner),
];

/// A role exactly as the backend delivered it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RawRole {
  Id(i64),
  Name(String),
  Object {
    id: Option<i64>,
    name: Option<String>,
  },
  #[default]
  Missing,
}

impl RawRole {
  /// Build a role from a user profile or scope record.
  ///
  /// `role_id` and `role_name` are tried before the same information nested
  /// in `role`, which may itself be an id, a name or an object. A top-level
  /// value the role tables do not know never hides a nested one they do.
  pub fn from_record(record: &Record) -> Self {
    let nested = record.get("role").map(RawRole::from).unwrap_or_default();
    let (nested_id, nested_name) = match nested {
      RawRole::Id(id) => (Some(id), None),
      RawRole::Name(name) => (None, Some(name)),
      RawRole::Object { id, name } => (id, name),
      RawRole::Missing => (None, None),
    };

    let id = pick_known(
      record.get("role_id").and_then(int_value),
      nested_id,
      |id| CanonicalRole::from_id(*id).is_some(),
    );
    let name = pick_known(
      record.get("role_name").and_then(text_value),
      nested_name,
      |name| CanonicalRole::from_keywords(name).is_some(),
    );

    match (id, name) {
      (None, None) => RawRole::Missing,
      (id, name) => RawRole::Object { id, name },
    }
  }

  pub fn is_missing(&self) -> bool {
    matches!(self, RawRole::Missing)
  }

  fn to_value(&self) -> Value {
    match self {
      RawRole::Id(id) => json!(id),
      RawRole::Name(name) => json!(name),
      RawRole::Object { id, name } => json!({ "id": id, "name": name }),
      RawRole::Missing => Value::Null,
    }
  }
}

impl From<&Value> for RawRole {
  fn from(value: &Value) -> Self {
    match value {
      Value::Number(_) => int_value(value).map(RawRole::Id).unwrap_or_default(),
      Value::String(s) => {
        let s = s.trim();
        if s.is_empty() {
          RawRole::Missing
        } else if let Ok(id) = s.parse::<i64>() {
          RawRole::Id(id)
        } else {
          RawRole::Name(s.to_string())
        }
      }
      Value::Object(obj) => RawRole::Object {
        id: obj
          .get("id")
          .or_else(|| obj.get("role_id"))
          .and_then(int_value),
        name: obj
          .get("name")
          .or_else(|| obj.get("role_name"))
          .and_then(text_value),
      },
      _ => RawRole::Missing,
    }
  }
}

impl Serialize for RawRole {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.to_value().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for RawRole {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(RawRole::from(&value))
  }
}

/// `top` unless only `nested` is recognized; either one when neither is.
fn pick_known<T>(top: Option<T>, nested: Option<T>, known: impl Fn(&T) -> bool) -> Option<T> {
  match (top, nested) {
    (Some(top), Some(nested)) if !known(&top) && known(&nested) => Some(nested),
    (top, nested) => top.or(nested),
  }
}

fn int_value(value: &Value) -> Option<i64> {
  match value {
    Value::Number(n) => n.as_i64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn text_value(value: &Value) -> Option<String> {
  value
    .as_str()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(String::from)
}

/// Map a raw role to its canonical key.
///
/// Precedence: bare numeric id, then an object's id, then an object's name,
/// then free text. Ids not in the table fall through to the name. Total and
/// side-effect free.
pub fn normalize_role(raw: &RawRole) -> CanonicalRole {
  let role = match raw {
    RawRole::Id(id) => CanonicalRole::from_id(*id),
    RawRole::Object { id, name } => id
      .and_then(CanonicalRole::from_id)
      .or_else(|| name.as_deref().and_then(CanonicalRole::from_keywords)),
    RawRole::Name(name) => CanonicalRole::from_keywords(name),
    RawRole::Missing => None,
  };
  role.unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
  }

  #[test]
  fn test_numeric_id_wins_over_name() {
    let raw = RawRole::from_record(&record(json!({
      "role_id": 1,
      "role_name": "something_else",
    })));
    assert_eq!(normalize_role(&raw), CanonicalRole::Bmmu);
    assert_eq!(normalize_role(&raw).as_str(), "bmmu");
  }

  #[test]
  fn test_unknown_inputs_are_empty() {
    let inputs = [
      Value::Null,
      json!({}),
      json!(42),
      json!("xyz"),
      json!(""),
      json!([1]),
      json!(true),
    ];
    for input in inputs {
      let role = normalize_role(&RawRole::from(&input));
      assert_eq!(role, CanonicalRole::Unknown, "input {}", input);
      assert_eq!(role.as_str(), "");
    }
    assert_eq!(normalize_role(&RawRole::Missing).as_str(), "");
  }

  #[test]
  fn test_object_name_used_when_id_unknown() {
    let raw = RawRole::from(&json!({ "id": 42, "name": "District DMMU" }));
    assert_eq!(normalize_role(&raw), CanonicalRole::Dmmu);
  }

  #[test]
  fn test_specific_keywords_before_generic() {
    let cases = [
      ("TP Contact Person", CanonicalRole::TpContactPerson),
      ("Training Partner", CanonicalRole::TrainingPartner),
      ("partner-admin", CanonicalRole::TrainingPartner),
      ("State Admin", CanonicalRole::StateAdmin),
      ("PMU Admin", CanonicalRole::PmuAdmin),
      ("BMMU", CanonicalRole::Bmmu),
      ("SMMU", CanonicalRole::Smmu),
      ("Master Trainer", CanonicalRole::MasterTrainer),
      ("CRP-EP", CanonicalRole::CrpEp),
      ("crp ld", CanonicalRole::CrpLd),
      ("DCNRLM", CanonicalRole::Dcnrlm),
    ];
    for (text, expected) in cases {
      assert_eq!(
        normalize_role(&RawRole::from(&json!(text))),
        expected,
        "{}",
        text
      );
    }
  }

  #[test]
  fn test_digit_string_is_an_id() {
    assert_eq!(RawRole::from(&json!("4")), RawRole::Id(4));
    assert_eq!(
      normalize_role(&RawRole::from(&json!("4"))),
      CanonicalRole::TrainingPartner
    );
  }

  #[test]
  fn test_nested_role_in_record() {
    let raw = RawRole::from_record(&record(json!({
      "id": 3,
      "role": { "id": 9, "name": "PMU" },
    })));
    assert_eq!(
      raw,
      RawRole::Object {
        id: Some(9),
        name: Some("PMU".to_string())
      }
    );
    assert_eq!(normalize_role(&raw), CanonicalRole::PmuAdmin);
  }

  #[test]
  fn test_unknown_top_level_id_does_not_hide_nested_id() {
    let raw = RawRole::from_record(&record(json!({
      "role_id": 42,
      "role": { "id": 1, "name": "something_else" },
    })));
    assert_eq!(normalize_role(&raw), CanonicalRole::Bmmu);
  }

  #[test]
  fn test_known_top_level_id_wins_over_nested_id() {
    let raw = RawRole::from_record(&record(json!({
      "role_id": 2,
      "role": { "id": 1 },
    })));
    assert_eq!(normalize_role(&raw), CanonicalRole::Dmmu);
  }

  #[test]
  fn test_nested_name_used_when_top_level_name_unknown() {
    let raw = RawRole::from_record(&record(json!({
      "role_name": "viewer",
      "role": { "name": "Master Trainer" },
    })));
    assert_eq!(normalize_role(&raw), CanonicalRole::MasterTrainer);
  }

  #[test]
  fn test_normalize_is_idempotent() {
    let raw = RawRole::from(&json!({ "name": "Master Trainer" }));
    assert_eq!(normalize_role(&raw), normalize_role(&raw));
  }

  #[test]
  fn test_raw_role_survives_persistence() {
    let raw = RawRole::Object {
      id: Some(2),
      name: Some("DMMU".to_string()),
    };
    let text = serde_json::to_string(&raw).unwrap();
    let back: RawRole = serde_json::from_str(&text).unwrap();
    assert_eq!(back, raw);
  }
}
