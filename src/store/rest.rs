use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::{into_document, Document, DocumentStore, StoreError};
use crate::config::StoreConfig;

/// Open connection to a Firebase Realtime Database style REST endpoint
///
/// Reads `GET {url}/.json`, writes `PUT {url}/{key}.json`. The handle is created
/// explicitly with [`StoreHandle::open`] and released with [`StoreHandle::close`].
pub struct StoreHandle {
    client: Client,
    base_url: String,
    auth: Option<String>,
}

impl StoreHandle {
    /// Opens a handle for the configured database
    ///
    /// # Errors
    /// Returns error if the URL is empty or the HTTP client cannot be built
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let base_url = config.url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(StoreError::Unavailable("store.url is empty".to_owned()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| StoreError::request(&base_url, source))?;

        info!(url = %base_url, "opened document store");

        Ok(Self {
            client,
            base_url,
            auth: config.auth.clone(),
        })
    }

    /// Releases the connection
    pub fn close(self) {
        info!(url = %self.base_url, "closing document store");
    }

    /// Public URL for `key` (root when `None`), without credentials
    fn resource_url(&self, key: Option<&str>) -> String {
        match key {
            Some(key) => format!("{}/{}.json", self.base_url, key),
            None => format!("{}/.json", self.base_url),
        }
    }

    /// Adds the `auth` query parameter (percent-encoded) when a token is configured
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(token) => request.query(&[("auth", token.as_str())]),
            None => request,
        }
    }
}

impl DocumentStore for StoreHandle {
    fn fetch_root(&self) -> Result<Document, StoreError> {
        let url = self.resource_url(None);
        let start = std::time::Instant::now();

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .map_err(|source| StoreError::request(&url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .map_err(|source| StoreError::request(&url, source))?;
        let root: Value = serde_json::from_str(&body)?;
        let document = into_document(root)?;

        debug!(
            keys = document.len(),
            latency_ms = start.elapsed().as_millis(),
            "fetched store document"
        );

        Ok(document)
    }

    fn set_child(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let url = self.resource_url(Some(key));
        let body = serde_json::to_string(value)?;

        let response = self
            .authorized(self.client.put(&url))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|source| StoreError::request(&url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                url,
                status: status.as_u16(),
            });
        }

        debug!(key, %value, "store write acknowledged");
        Ok(())
    }
}
