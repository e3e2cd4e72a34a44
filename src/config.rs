use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::api::EntityId;
use crate::geoscope::CurrentUser;
use crate::hydrate::LookupHydrator;
use crate::role::RawRole;
use crate::store::SqliteBackend;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub session: Option<SessionConfig>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub hydration: HydrationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the REST API, e.g. https://tms.example.gov.in/api/
  pub url: String,
}

/// Profile of the signed-in user, as returned by the login endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
  pub user_id: EntityId,
  #[serde(default)]
  pub role_id: Option<Value>,
  #[serde(default)]
  pub role_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Store location override (defaults to the user data directory)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HydrationConfig {
  /// Maximum label lookups in flight per page load
  #[serde(default = "default_concurrency")]
  pub concurrency: usize,
}

impl Default for HydrationConfig {
  fn default() -> Self {
    Self {
      concurrency: default_concurrency(),
    }
  }
}

fn default_concurrency() -> usize {
  LookupHydrator::DEFAULT_CONCURRENCY
}

impl SessionConfig {
  /// `role_id` wins over `role_name` when both are set.
  pub fn current_user(&self) -> CurrentUser {
    let role = match (&self.role_id, &self.role_name) {
      (Some(id), _) if !id.is_null() => RawRole::from(id),
      (_, Some(name)) => RawRole::Name(name.clone()),
      _ => RawRole::Missing,
    };
    CurrentUser::new(self.user_id.clone(), role)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tmsdash.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tmsdash/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/tmsdash/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("tmsdash.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tmsdash").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let mut config: Config = serde_yaml::from_str(contents)?;
    config.hydration.concurrency = config.hydration.concurrency.max(1);
    Ok(config)
  }

  /// Signed-in user from the `session` section.
  pub fn current_user(&self) -> Result<CurrentUser> {
    self
      .session
      .as_ref()
      .map(SessionConfig::current_user)
      .ok_or_else(|| eyre!("No session configured. Add a `session.user_id` to the config file."))
  }

  /// Where the key-value store lives.
  pub fn store_path(&self) -> Result<PathBuf> {
    match &self.cache.path {
      Some(path) => Ok(path.clone()),
      None => SqliteBackend::default_path(),
    }
  }

  /// Get the API token from environment variables.
  ///
  /// Checks TMSDASH_API_TOKEN first, then TMS_API_TOKEN as fallback. Without
  /// either, requests go out unauthenticated.
  pub fn get_api_token() -> Option<String> {
    std::env::var("TMSDASH_API_TOKEN")
      .or_else(|_| std::env::var("TMS_API_TOKEN"))
      .ok()
      .filter(|token| !token.trim().is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_minimal_config() {
    let config = Config::parse("api:\n  url: https://tms.example.gov.in/api/\n").unwrap();
    assert_eq!(config.api.url, "https://tms.example.gov.in/api/");
    assert!(config.session.is_none());
    assert!(config.cache.path.is_none());
    assert_eq!(config.hydration.concurrency, 6);
    assert!(config.current_user().is_err());
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
api:
  url: https://tms.example.gov.in/api/
session:
  user_id: 12
  role_id: 1
  role_name: something_else
cache:
  path: /tmp/tmsdash/store.db
hydration:
  concurrency: 0
"#;
    let config = Config::parse(yaml).unwrap();
    let user = config.current_user().unwrap();
    assert_eq!(user.id, EntityId::from(12));
    assert_eq!(user.role, RawRole::Id(1));
    assert_eq!(config.store_path().unwrap(), PathBuf::from("/tmp/tmsdash/store.db"));
    assert_eq!(config.hydration.concurrency, 1);
  }

  #[test]
  fn test_role_name_only() {
    let yaml = "api:\n  url: http://x/\nsession:\n  user_id: \"u-7\"\n  role_name: BMMU\n";
    let user = Config::parse(yaml).unwrap().current_user().unwrap();
    assert_eq!(user.id, EntityId::from("u-7"));
    assert_eq!(user.role, RawRole::Name("BMMU".to_string()));
  }

  #[test]
  fn test_missing_api_is_an_error() {
    assert!(Config::parse("session:\n  user_id: 1\n").is_err());
  }

  #[test]
  fn test_load_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "api:\n  url: http://localhost:8000/api/").unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.api.url, "http://localhost:8000/api/");

    let missing = Config::load(Some(Path::new("/nonexistent/tmsdash.yaml")));
    assert!(missing.unwrap_err().to_string().contains("not found"));
  }
}
