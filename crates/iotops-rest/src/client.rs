//! Shared HTTP plumbing: URL building, request headers, error translation

use iotops_core::ServiceError;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP client shared by the hub and Digital Twins implementations
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("iotops/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    /// Start a request against `https://{host}/{segments...}?api-version=...`
    pub(crate) fn request(
        &self,
        method: Method,
        host: &str,
        segments: &[&str],
        api_version: &str,
        authorization: &str,
    ) -> Result<RequestBuilder, ServiceError> {
        let url = build_url(host, segments, api_version)?;
        Ok(self.request_url(method, url, authorization))
    }

    /// Start a request against an absolute URL (e.g. a `nextLink`)
    pub(crate) fn request_url(&self, method: Method, url: Url, authorization: &str) -> RequestBuilder {
        trace!(method = %method, url = %url, "Building request");
        self.http
            .request(method, url)
            .header(AUTHORIZATION, authorization)
            .header("x-ms-client-request-id", Uuid::new_v4().to_string())
    }

    /// Send a request, turning non-success statuses into [`ServiceError`]
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response, ServiceError> {
        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(status = %status, url = %response.url(), "Request succeeded");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = %status, body = %body, "Request failed");
        Err(ServiceError::Response {
            status: status.as_u16(),
            message: error_message(status, &body),
        })
    }

    pub(crate) async fn send_text(&self, request: RequestBuilder) -> Result<String, ServiceError> {
        self.send(request)
            .await?
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ServiceError> {
        let body = self.send_text(request).await?;
        serde_json::from_str(&body).map_err(|e| ServiceError::Decode(e.to_string()))
    }

    /// Send a request whose response body is irrelevant
    pub(crate) async fn send_empty(&self, request: RequestBuilder) -> Result<(), ServiceError> {
        self.send(request).await.map(|_| ())
    }
}

pub(crate) fn build_url(host: &str, segments: &[&str], api_version: &str) -> Result<Url, ServiceError> {
    let mut url = Url::parse(&format!("https://{}", host))
        .map_err(|e| ServiceError::Transport(format!("Invalid host '{}': {}", host, e)))?;

    url.path_segments_mut()
        .map_err(|_| ServiceError::Transport(format!("Invalid host '{}'", host)))?
        .clear()
        .extend(segments);
    url.query_pairs_mut().append_pair("api-version", api_version);
    Ok(url)
}

/// Extract a human-readable message from an error response body
///
/// Digital Twins answers `{"error": {"code", "message"}}`, IoT Hub answers
/// `{"Message": "...", "ExceptionMessage": "..."}`. Anything else falls back
/// to the raw body, then to the status text.
pub fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let message = json
            .pointer("/error/message")
            .or_else(|| json.get("Message"))
            .or_else(|| json.get("message"))
            .and_then(Value::as_str);

        if let Some(message) = message {
            let code = json.pointer("/error/code").and_then(Value::as_str);
            return match code {
                Some(code) => format!("{}: {}", code, message),
                None => message.to_string(),
            };
        }
    }

    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    } else {
        body.to_string()
    }
}
