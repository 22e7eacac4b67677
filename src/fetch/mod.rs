//! Remote fetcher: one network request per unit of work
//!
//! This module contains:
//! - The `Fetcher` trait every backend implements
//! - Request/payload types shared by the backends
//! - Error classification into retryable and fatal failures
//! - Client construction from the `[client]` configuration

mod extract_api;
mod http;

pub use extract_api::ExtractApiFetcher;
pub use http::HttpFetcher;

use crate::config::{Backend, ClientConfig};
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// HTTP method of a fetch request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum HttpMethod {
    #[default]
    #[serde(rename = "GET", alias = "get")]
    Get,
    #[serde(rename = "POST", alias = "post")]
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully formed request; carries no retry policy of its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Return the browser-rendered page rather than the raw response body
    pub render: bool,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            body: None,
            render: false,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            headers: Vec::new(),
            body: Some(body.into()),
            render: false,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn rendered(mut self) -> Self {
        self.render = true;
        self
    }
}

/// Raw response of a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    /// HTTP status code of the target response
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawPayload {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A failed fetch, tagged with whether trying again can help
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct FetchError {
    pub reason: String,
    pub retryable: bool,
}

impl FetchError {
    /// Timeout, rate limiting, server-side failure
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: true,
        }
    }

    /// Client-side failure; repeating the request cannot succeed
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: false,
        }
    }
}

/// Classifies an HTTP status code
///
/// | Status | Result |
/// |--------|--------|
/// | 2xx | `None` (success) |
/// | 429 | retryable (rate limited) |
/// | 5xx | retryable |
/// | anything else | fatal |
pub fn classify_status(status: u16, url: &str) -> Option<FetchError> {
    match status {
        200..=299 => None,
        429 => Some(FetchError::retryable(format!(
            "HTTP 429 (rate limited) from {}",
            url
        ))),
        500..=599 => Some(FetchError::retryable(format!("HTTP {} from {}", status, url))),
        _ => Some(FetchError::fatal(format!("HTTP {} from {}", status, url))),
    }
}

/// Classifies a transport-level `reqwest` error
pub(crate) fn classify_transport_error(error: reqwest::Error, url: &str) -> FetchError {
    if error.is_timeout() {
        FetchError::retryable(format!("Request timeout for {}", url))
    } else if error.is_connect() {
        FetchError::retryable(format!("Connection failed for {}: {}", url, error))
    } else if error.is_builder() || error.is_redirect() {
        FetchError::fatal(format!("Malformed request for {}: {}", url, error))
    } else {
        FetchError::retryable(format!("Transport error for {}: {}", url, error))
    }
}

/// Trait for remote fetch backends
///
/// Implementations perform exactly one outbound call per invocation, apply a
/// bounded timeout, and report every failure as a `FetchError`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<RawPayload, FetchError>;
}

/// Builds an HTTP client with the configured user agent and timeouts
pub fn build_http_client(config: &ClientConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Builds the fetcher selected by `[client] backend`
///
/// Credentials are read from the environment variable named by `api-key-env`;
/// a configured but unset variable is reported as `MissingCredentials`.
pub fn build_fetcher(config: &ClientConfig) -> Result<Arc<dyn Fetcher>, HarvestError> {
    let client = build_http_client(config)?;
    let api_key = read_api_key(config)?;

    match config.backend {
        Backend::Http => Ok(Arc::new(HttpFetcher::new(client, api_key))),
        Backend::ExtractApi => {
            let endpoint = config.extract_endpoint.clone().ok_or_else(|| {
                crate::ConfigError::Validation(
                    "extract-endpoint is required for the extract-api backend".to_string(),
                )
            })?;
            let api_key = api_key.ok_or_else(|| HarvestError::MissingCredentials {
                var: config.api_key_env.clone().unwrap_or_default(),
            })?;
            Ok(Arc::new(ExtractApiFetcher::new(client, endpoint, api_key)))
        }
    }
}

fn read_api_key(config: &ClientConfig) -> Result<Option<String>, HarvestError> {
    let Some(var) = &config.api_key_env else {
        return Ok(None);
    };

    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(Some(value)),
        _ => Err(HarvestError::MissingCredentials { var: var.clone() }),
    }
}
