//! Direct HTTP backend

use crate::fetch::{
    classify_status, classify_transport_error, FetchError, FetchRequest, Fetcher, HttpMethod,
    RawPayload,
};
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

/// Sends requests straight to the target site
pub struct HttpFetcher {
    client: Client,
    /// Sent as `Authorization: Bearer ...` when present
    bearer_token: Option<String>,
}

impl HttpFetcher {
    pub fn new(client: Client, bearer_token: Option<String>) -> Self {
        Self {
            client,
            bearer_token,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<RawPayload, FetchError> {
        let url = Url::parse(&request.url)
            .map_err(|e| FetchError::fatal(format!("Invalid URL {}: {}", request.url, e)))?;

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_transport_error(e, &request.url))?;

        let status = response.status().as_u16();
        if let Some(error) = classify_status(status, &request.url) {
            tracing::debug!("{} {} -> {}", request.method, request.url, status);
            return Err(error);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_transport_error(e, &request.url))?;

        tracing::trace!(
            "{} {} -> {} ({} bytes)",
            request.method,
            request.url,
            status,
            body.len()
        );

        Ok(RawPayload {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::fetch::build_http_client;

    #[tokio::test]
    async fn test_invalid_url_is_fatal() {
        let client = build_http_client(&ClientConfig::default()).unwrap();
        let fetcher = HttpFetcher::new(client, None);

        let error = fetcher
            .fetch(&FetchRequest::get("not a url"))
            .await
            .unwrap_err();
        assert!(!error.retryable);
    }

    #[tokio::test]
    async fn test_invalid_header_is_fatal() {
        let client = build_http_client(&ClientConfig::default()).unwrap();
        let fetcher = HttpFetcher::new(client, None);

        let request = FetchRequest::get("http://127.0.0.1:9/").with_header("bad header", "x");
        let error = fetcher.fetch(&request).await.unwrap_err();
        assert!(!error.retryable);
    }
}
