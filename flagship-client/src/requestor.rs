//! Fetching the flag set from the flag service.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use flagship_eval::Flag;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::collections::HashMap;
use tracing::{debug, error};
use url::Url;

/// Source of complete flag snapshots.
#[async_trait]
pub trait FeatureRequestor: Send + Sync {
    /// Fetch every flag, keyed by flag key.
    async fn fetch_all(&self) -> ClientResult<HashMap<String, Flag>>;
}

/// Build a reqwest client carrying the api key and user agent.
pub(crate) fn http_client(config: &ClientConfig) -> ClientResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    let auth = HeaderValue::from_str(&format!("api_key {}", config.api_key))
        .map_err(|e| ClientError::Config(format!("invalid API key: {e}")))?;
    headers.insert(AUTHORIZATION, auth);

    Ok(reqwest::Client::builder()
        .timeout(config.request_timeout)
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .build()?)
}

/// Map a failed response to [`ClientError::Status`], logging it.
pub(crate) async fn status_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED => error!("Invalid API key"),
        StatusCode::NOT_FOUND => error!("Resource not found"),
        _ => error!(status = status.as_u16(), "Unexpected status code"),
    }
    let message = response.text().await.unwrap_or_default();
    ClientError::Status {
        status: status.as_u16(),
        message,
    }
}

/// [`FeatureRequestor`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFeatureRequestor {
    http: reqwest::Client,
    url: Url,
}

impl HttpFeatureRequestor {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        Ok(Self {
            http: http_client(config)?,
            url: config.flags_url()?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl FeatureRequestor for HttpFeatureRequestor {
    async fn fetch_all(&self) -> ClientResult<HashMap<String, Flag>> {
        debug!(url = %self.url, "Fetching flags");

        let response = self.http.get(self.url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body = response.bytes().await?;
        let flags: HashMap<String, Flag> = serde_json::from_slice(&body)?;
        debug!(count = flags.len(), "Fetched flags");
        Ok(flags)
    }
}
