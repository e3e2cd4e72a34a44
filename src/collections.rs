//! Backend collections the dashboards list, and the id fields each one hydrates.

use std::fmt;
use std::str::FromStr;

use crate::hydrate::{EntityKind, FieldSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
  TrainingRequests,
  Batches,
  Partners,
  Centres,
  Plans,
  Certificates,
}

#[derive(Debug, Clone)]
pub struct CollectionInfo {
  pub collection: Collection,
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  pub hydrate: &'static [FieldSpec],
}

/// All listable collections
pub const COLLECTIONS: &[CollectionInfo] = &[
  CollectionInfo {
    collection: Collection::TrainingRequests,
    name: "training-requests",
    aliases: &["requests", "tr"],
    description: "Training requests raised for a block",
    hydrate: &[
      FieldSpec::new("created_by", EntityKind::User),
      FieldSpec::new("partner", EntityKind::Partner),
      FieldSpec::new("training_plan", EntityKind::Plan),
      FieldSpec::new("block", EntityKind::Block),
    ],
  },
  CollectionInfo {
    collection: Collection::Batches,
    name: "batches",
    aliases: &["b", "batch"],
    description: "Training batches",
    hydrate: &[
      FieldSpec::new("centre", EntityKind::Centre),
      FieldSpec::new("partner", EntityKind::Partner),
      FieldSpec::new("trainer", EntityKind::User),
      FieldSpec::new("district", EntityKind::District),
    ],
  },
  CollectionInfo {
    collection: Collection::Partners,
    name: "training-partners",
    aliases: &["partners", "tp"],
    description: "Empanelled training partners",
    hydrate: &[FieldSpec::new("contact_person", EntityKind::User)],
  },
  CollectionInfo {
    collection: Collection::Centres,
    name: "training-centres",
    aliases: &["centres", "centers"],
    description: "Training centres",
    hydrate: &[
      FieldSpec::new("partner", EntityKind::Partner),
      FieldSpec::new("district", EntityKind::District),
      FieldSpec::new("block", EntityKind::Block),
    ],
  },
  CollectionInfo {
    collection: Collection::Plans,
    name: "training-plans",
    aliases: &["plans"],
    description: "Training plans",
    hydrate: &[FieldSpec::new("created_by", EntityKind::User)],
  },
  CollectionInfo {
    collection: Collection::Certificates,
    name: "certificates",
    aliases: &["certs"],
    description: "Issued participant certificates",
    hydrate: &[
      FieldSpec::new("batch_partner", EntityKind::Partner),
      FieldSpec::new("issued_by", EntityKind::User),
    ],
  },
];

impl Collection {
  /// Row of `COLLECTIONS` describing this collection.
  pub fn info(&self) -> &'static CollectionInfo {
    let row = match self {
      Self::TrainingRequests => 0,
      Self::Batches => 1,
      Self::Partners => 2,
      Self::Centres => 3,
      Self::Plans => 4,
      Self::Certificates => 5,
    };
    &COLLECTIONS[row]
  }

  /// Backend collection name, also the cache key prefix.
  pub fn name(&self) -> &'static str {
    self.info().name
  }

  pub fn hydrate_fields(&self) -> &'static [FieldSpec] {
    self.info().hydrate
  }

  /// Whether list requests of the region dashboard are filtered by block.
  pub fn block_scoped(&self) -> bool {
    matches!(self, Self::TrainingRequests | Self::Batches | Self::Centres)
  }

  /// Look up a collection by name or alias, case-insensitively.
  pub fn parse(input: &str) -> Option<Self> {
    let input = input.trim().to_lowercase();
    COLLECTIONS
      .iter()
      .find(|info| info.name == input || info.aliases.contains(&input.as_str()))
      .map(|info| info.collection)
  }
}

impl fmt::Display for Collection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Collection {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s).ok_or_else(|| {
      let known: Vec<&str> = COLLECTIONS.iter().map(|info| info.name).collect();
      format!("unknown collection '{}' (known: {})", s, known.join(", "))
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_name_and_alias() {
    assert_eq!(Collection::parse("batches"), Some(Collection::Batches));
    assert_eq!(Collection::parse("TR"), Some(Collection::TrainingRequests));
    assert_eq!(Collection::parse(" centers "), Some(Collection::Centres));
    assert_eq!(Collection::parse("nope"), None);
  }

  #[test]
  fn test_from_str_lists_known_collections() {
    let err = "nope".parse::<Collection>().unwrap_err().to_string();
    assert!(err.contains("training-requests"));
  }

  #[test]
  fn test_info_row_matches_variant() {
    let all = [
      Collection::TrainingRequests,
      Collection::Batches,
      Collection::Partners,
      Collection::Centres,
      Collection::Plans,
      Collection::Certificates,
    ];
    assert_eq!(all.len(), COLLECTIONS.len());
    for collection in all {
      assert_eq!(collection.info().collection, collection);
    }
    assert_eq!(Collection::Certificates.name(), "certificates");
  }

  #[test]
  fn test_every_collection_has_one_row() {
    for info in COLLECTIONS {
      let rows = COLLECTIONS
        .iter()
        .filter(|other| other.collection == info.collection)
        .count();
      assert_eq!(rows, 1, "{}", info.name);
      assert_eq!(info.collection.name(), info.name);
    }
  }
}
