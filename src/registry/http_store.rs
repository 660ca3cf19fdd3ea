//! Registry store backed by a remote injector's HTTP API.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use super::store::{RegistryStore, StoreError};
use crate::forwarder::error_chain;
use crate::record::ServiceRecord;

/// Talks to `GET /services/{id}` and `POST /services` on another injector.
///
/// One `Client` is built up front and reused for every call, so connections
/// are pooled rather than opened per request.
pub struct HttpStore {
    client: Client,
    base_url: Url,
}

impl HttpStore {
    /// Returns an error if the HTTP client fails to build (e.g., TLS configuration issues).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, String> {
        let base_url = Url::parse(base_url)
            .map_err(|e| format!("invalid registry URL '{}': {}", base_url, e))?;
        if base_url.cannot_be_a_base() {
            return Err(format!("invalid registry URL '{}'", base_url));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;
        Ok(Self { client, base_url })
    }

    /// `{base}/services[/{id}]`, with `id` percent-encoded as one path segment.
    fn services_url(&self, id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`, so the path is always segmentable.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("services");
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }
}

fn transport_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Unavailable("request timed out".to_string())
    } else {
        StoreError::Unavailable(error_chain(&e))
    }
}

#[async_trait::async_trait]
impl RegistryStore for HttpStore {
    async fn find_by_identifier(&self, id: &str) -> Result<Option<ServiceRecord>, StoreError> {
        let url = self.services_url(Some(id));
        debug!(%url, "querying remote registry");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK => response
                .json::<ServiceRecord>()
                .await
                .map(Some)
                .map_err(|e| StoreError::Backend(format!("invalid service record: {}", e))),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(StoreError::Unavailable(format!(
                "HTTP {} from {}",
                status.as_u16(),
                url
            ))),
        }
    }

    async fn insert(&self, record: ServiceRecord) -> Result<(), StoreError> {
        let url = self.services_url(None);
        let response = self
            .client
            .post(url.clone())
            .json(&record)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(StoreError::Duplicate(record.id)),
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Rejected(body))
            }
            status => Err(StoreError::Unavailable(format!(
                "HTTP {} from {}",
                status.as_u16(),
                url
            ))),
        }
    }
}
