//! Extraction-API backend
//!
//! Each request is described as a JSON job and posted to the extraction
//! service, which performs it on our behalf and returns the target's response
//! body base64-encoded. Rendered requests ask for `browserHtml` instead, the
//! page as a headless browser sees it, returned as plain text.

use crate::fetch::{
    classify_status, classify_transport_error, FetchError, FetchRequest, Fetcher, RawPayload,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractJob<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_request_method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_response_body: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    browser_html: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    custom_http_request_headers: Vec<HeaderPair<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_request_text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct HeaderPair<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractReply {
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    http_response_body: Option<String>,
    #[serde(default)]
    browser_html: Option<String>,
}

/// Routes requests through an extraction API authenticated with HTTP Basic auth
pub struct ExtractApiFetcher {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl ExtractApiFetcher {
    pub fn new(client: Client, endpoint: String, api_key: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }

    fn job_for<'a>(request: &'a FetchRequest) -> ExtractJob<'a> {
        if request.render {
            return ExtractJob {
                url: &request.url,
                http_request_method: None,
                http_response_body: None,
                browser_html: Some(true),
                custom_http_request_headers: Vec::new(),
                http_request_text: None,
            };
        }

        ExtractJob {
            url: &request.url,
            http_request_method: Some(request.method.as_str()),
            http_response_body: Some(true),
            browser_html: None,
            custom_http_request_headers: request
                .headers
                .iter()
                .map(|(name, value)| HeaderPair {
                    name: name.as_str(),
                    value: value.as_str(),
                })
                .collect(),
            http_request_text: request.body.as_deref(),
        }
    }
}

#[async_trait]
impl Fetcher for ExtractApiFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<RawPayload, FetchError> {
        let job = serde_json::to_vec(&Self::job_for(request))
            .map_err(|e| FetchError::fatal(format!("Cannot encode extract job: {}", e)))?;

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.api_key, Some(""))
            .header("Content-Type", "application/json")
            .body(job)
            .send()
            .await
            .map_err(|e| classify_transport_error(e, &self.endpoint))?;

        // The service's own status first: 429 and 5xx are worth retrying, auth errors are not
        if let Some(mut error) = classify_status(response.status().as_u16(), &self.endpoint) {
            error.reason = format!("{} (extracting {})", error.reason, request.url);
            return Err(error);
        }

        let raw = response
            .bytes()
            .await
            .map_err(|e| classify_transport_error(e, &self.endpoint))?;

        let reply: ExtractReply = serde_json::from_slice(&raw).map_err(|e| {
            FetchError::fatal(format!("Malformed extract reply for {}: {}", request.url, e))
        })?;

        let status = reply.status_code.unwrap_or(200);
        if let Some(error) = classify_status(status, &request.url) {
            return Err(error);
        }

        let body = if request.render {
            reply.browser_html.map(String::into_bytes).ok_or_else(|| {
                FetchError::fatal(format!("Extract reply for {} has no browserHtml", request.url))
            })?
        } else {
            let encoded = reply.http_response_body.ok_or_else(|| {
                FetchError::fatal(format!("Extract reply for {} has no body", request.url))
            })?;
            STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                FetchError::fatal(format!("Undecodable body for {}: {}", request.url, e))
            })?
        };

        Ok(RawPayload { status, body })
    }
}
