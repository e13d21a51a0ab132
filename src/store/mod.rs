//! Client for the external search store.
//!
//! The store itself is an external collaborator: this module only wraps
//! the handful of endpoints the pipeline consumes (existence check, index
//! create/delete, bulk write, cluster health) and classifies the failure
//! modes the pipeline must tolerate.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use snafu::prelude::*;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::config::StoreSettings;
use crate::error::{
    BadHeaderSnafu, CaParseSnafu, CaReadSnafu, ClientBuildSnafu, EndpointSnafu, RequestSnafu,
    ResponseParseSnafu, StoreError, UnexpectedStatusSnafu,
};

/// Request timeout for every store call. Connectivity failures surface as
/// fatal [`StoreError::Request`] values, never retried here.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response to a bulk write, evaluated per item by the store.
#[derive(Debug, Default, Deserialize)]
pub struct BulkResponse {
    /// True when at least one item failed.
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    /// Item-level error bodies, in response order.
    pub fn item_errors(&self) -> Vec<&Value> {
        self.items
            .iter()
            .filter_map(|item| item.index.as_ref())
            .filter_map(|status| status.error.as_ref())
            .collect()
    }
}

/// One item outcome inside a bulk response.
#[derive(Debug, Default, Deserialize)]
pub struct BulkItem {
    /// Outcome of an `index` action.
    pub index: Option<BulkItemStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BulkItemStatus {
    #[serde(default)]
    pub status: u16,
    pub error: Option<Value>,
}

/// Subset of the cluster health response the status mode reports.
#[derive(Debug, Default, Deserialize)]
pub struct ClusterHealth {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub active_shards: u64,
    #[serde(default)]
    pub number_of_nodes: u64,
}

/// Operations the pipeline consumes from the store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Whether an index exists. Non-2xx answers mean "no".
    async fn index_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Create an index from a mapping definition. An "already exists"
    /// conflict is logged and recovered, not an error.
    async fn create_index(&self, name: &str, mapping: &Value) -> Result<(), StoreError>;

    /// Delete an index. Returns `false` when it did not exist.
    async fn delete_index(&self, name: &str) -> Result<bool, StoreError>;

    /// Submit one newline-delimited bulk payload.
    async fn bulk(&self, payload: Bytes, refresh: bool) -> Result<BulkResponse, StoreError>;

    /// Cluster health summary.
    async fn cluster_health(&self) -> Result<ClusterHealth, StoreError>;
}

/// HTTP implementation of [`Store`].
pub struct StoreClient {
    client: reqwest::Client,
    base: Url,
}

impl StoreClient {
    /// Build a client from connection settings. Auth and custom headers are
    /// attached to every request; TLS verification follows `ssl_verify` and
    /// `ca_file`.
    pub fn new(settings: &StoreSettings) -> Result<Self, StoreError> {
        let base = Url::parse(&settings.endpoint).context(EndpointSnafu {
            endpoint: settings.endpoint.clone(),
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &settings.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .ok()
                .context(BadHeaderSnafu { name })?;
            let header_value = HeaderValue::from_str(value)
                .ok()
                .context(BadHeaderSnafu { name })?;
            headers.insert(header_name, header_value);
        }
        if let Some(auth) = build_auth_header(settings) {
            let mut value =
                HeaderValue::from_str(&auth).ok().context(BadHeaderSnafu {
                    name: AUTHORIZATION.as_str(),
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT);

        if !settings.ssl_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(ca_file) = &settings.ca_file {
            let pem = std::fs::read(ca_file).context(CaReadSnafu {
                path: ca_file.display().to_string(),
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem).context(CaParseSnafu {
                path: ca_file.display().to_string(),
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        let client = builder.build().context(ClientBuildSnafu)?;
        Ok(Self { client, base })
    }

    /// Join a path onto the endpoint, preserving any base path prefix.
    fn url(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        let merged = format!(
            "{}/{}",
            self.base.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&merged);
        url
    }
}

fn build_auth_header(settings: &StoreSettings) -> Option<String> {
    if let Some(api_key) = &settings.api_key {
        return Some(format!("ApiKey {api_key}"));
    }
    if let (Some(user), Some(password)) = (&settings.user, &settings.password) {
        let token = BASE64.encode(format!("{user}:{password}"));
        return Some(format!("Basic {token}"));
    }
    None
}

#[async_trait]
impl Store for StoreClient {
    async fn index_exists(&self, name: &str) -> Result<bool, StoreError> {
        let response = self
            .client
            .head(self.url(name))
            .send()
            .await
            .context(RequestSnafu)?;
        Ok(response.status().is_success())
    }

    async fn create_index(&self, name: &str, mapping: &Value) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.url(name))
            .json(mapping)
            .send()
            .await
            .context(RequestSnafu)?;

        let status = response.status();
        if status.is_success() {
            info!("Index '{name}' created");
            return Ok(());
        }
        if status == StatusCode::CONFLICT {
            warn!("Index '{name}' already exists (conflict)");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        UnexpectedStatusSnafu {
            operation: "Index creation",
            status: status.as_u16(),
            body,
        }
        .fail()
    }

    async fn delete_index(&self, name: &str) -> Result<bool, StoreError> {
        let response = self
            .client
            .delete(self.url(name))
            .send()
            .await
            .context(RequestSnafu)?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        let body = response.text().await.unwrap_or_default();
        UnexpectedStatusSnafu {
            operation: "Index deletion",
            status: status.as_u16(),
            body,
        }
        .fail()
    }

    async fn bulk(&self, payload: Bytes, refresh: bool) -> Result<BulkResponse, StoreError> {
        let refresh = if refresh { "true" } else { "false" };
        let response = self
            .client
            .post(self.url("_bulk"))
            .query(&[("refresh", refresh)])
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(payload)
            .send()
            .await
            .context(RequestSnafu)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return UnexpectedStatusSnafu {
                operation: "Bulk request",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        response
            .json::<BulkResponse>()
            .await
            .context(ResponseParseSnafu { operation: "bulk" })
    }

    async fn cluster_health(&self) -> Result<ClusterHealth, StoreError> {
        let response = self
            .client
            .get(self.url("_cluster/health"))
            .send()
            .await
            .context(RequestSnafu)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return UnexpectedStatusSnafu {
                operation: "Cluster health request",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        response
            .json::<ClusterHealth>()
            .await
            .context(ResponseParseSnafu {
                operation: "cluster health",
            })
    }
}
