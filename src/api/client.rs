use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::api::types::{EntityId, ListParams, Page, Record};
use crate::config::Config;
use crate::error::BackendError;
use crate::geoscope::GeoScope;

/// The REST backend, seen as a handful of logical operations.
#[async_trait]
pub trait Backend: Send + Sync {
  /// One page of a collection.
  async fn fetch_collection(
    &self,
    collection: &str,
    params: &ListParams,
  ) -> Result<Page, BackendError>;

  /// A single record by id.
  async fn fetch_detail(&self, collection: &str, id: &EntityId) -> Result<Record, BackendError>;

  /// A single record trimmed to `fields`, or `None` if it does not exist.
  async fn fetch_by_id(
    &self,
    collection: &str,
    id: &EntityId,
    fields: &[&str],
  ) -> Result<Option<Record>, BackendError>;

  /// The geographic scope and role assigned to a user.
  async fn fetch_geoscope(&self, user_id: &EntityId) -> Result<GeoScope, BackendError>;
}

const GEOSCOPE_COLLECTION: &str = "user-geoscope";

/// `Backend` over the dashboard's REST API.
#[derive(Clone)]
pub struct HttpBackend {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpBackend {
  pub fn new(config: &Config) -> color_eyre::Result<Self> {
    Self::with_token(&config.api.url, Config::get_api_token())
  }

  pub fn with_token(base_url: &str, token: Option<String>) -> color_eyre::Result<Self> {
    let mut base = base_url.trim().to_string();
    if !base.ends_with('/') {
      base.push('/');
    }
    let base_url = Url::parse(&base)
      .map_err(|e| color_eyre::eyre::eyre!("Invalid API url {}: {}", base_url, e))?;

    let client = reqwest::Client::builder()
      .user_agent(concat!("tmsdash/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| color_eyre::eyre::eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url,
      token,
    })
  }

  /// `{base}/{segments...}/` with each segment percent-encoded.
  fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| BackendError::Network(format!("cannot build path on {}", self.base_url)))?
      .pop_if_empty()
      .extend(segments)
      .push("");
    Ok(url)
  }

  /// GET `url`; `Ok(None)` on 404.
  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, BackendError> {
    debug!(%url, "GET");
    let mut request = self.client.get(url.clone());
    if let Some(token) = &self.token {
      request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let response = request.send().await?;
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(BackendError::Status {
        status: status.as_u16(),
        body,
      });
    }

    let bytes = response.bytes().await?;
    Ok(Some(serde_json::from_slice(&bytes)?))
  }

  async fn get_required<T: DeserializeOwned>(&self, url: Url) -> Result<T, BackendError> {
    self
      .get_json(url)
      .await?
      .ok_or_else(|| BackendError::Status {
        status: StatusCode::NOT_FOUND.as_u16(),
        body: "not found".to_string(),
      })
  }
}

#[async_trait]
impl Backend for HttpBackend {
  async fn fetch_collection(
    &self,
    collection: &str,
    params: &ListParams,
  ) -> Result<Page, BackendError> {
    let mut url = self.endpoint(&[collection])?;
    url.query_pairs_mut().extend_pairs(params.pairs());
    self.get_required(url).await
  }

  async fn fetch_detail(&self, collection: &str, id: &EntityId) -> Result<Record, BackendError> {
    let url = self.endpoint(&[collection, id.as_str()])?;
    self.get_required(url).await
  }

  async fn fetch_by_id(
    &self,
    collection: &str,
    id: &EntityId,
    fields: &[&str],
  ) -> Result<Option<Record>, BackendError> {
    let mut url = self.endpoint(&[collection, id.as_str()])?;
    if !fields.is_empty() {
      url.query_pairs_mut().append_pair("fields", &fields.join(","));
    }
    self.get_json(url).await
  }

  async fn fetch_geoscope(&self, user_id: &EntityId) -> Result<GeoScope, BackendError> {
    let url = self.endpoint(&[GEOSCOPE_COLLECTION, user_id.as_str()])?;
    let record: Record = self.get_required(url).await?;
    Ok(GeoScope::from_record(user_id, &record))
  }
}
