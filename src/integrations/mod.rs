pub mod api;
pub mod environment;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::time::Duration;

/// Shared HTTP client for all API requests to enable connection pooling
pub static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(5)
        .user_agent("issue-stream")
        .build()
        .expect("Failed to create HTTP client")
});

/// A settled HTTP exchange.
///
/// Non-2xx statuses are still `Ok`; callers decide what an error status
/// means for them. Header names are stored lowercased.
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Human-readable `detail` from an error body, if the backend sent one
    pub fn error_detail(&self) -> Option<String> {
        self.body["detail"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    }
}

/// HTTP seam used by everything that talks to the backend.
///
/// `target` is either an API path (`/projects/...`) resolved against the
/// transport's base URL, or an absolute URL as found in pagination links.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, target: &str, params: &[(String, String)]) -> Result<ApiResponse>;

    async fn post(&self, target: &str, body: serde_json::Value) -> Result<ApiResponse>;
}

/// Production transport over the shared reqwest client
#[derive(Clone)]
pub struct ReqwestTransport {
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn resolve(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else {
            format!("{}/{}", self.base_url, target.trim_start_matches('/'))
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, target: &str, params: &[(String, String)]) -> Result<ApiResponse> {
        let url = self.resolve(target);
        tracing::debug!("GET {}", url);
        let response = self
            .authorize(HTTP_CLIENT.get(&url).query(params))
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;
        into_api_response(response).await
    }

    async fn post(&self, target: &str, body: serde_json::Value) -> Result<ApiResponse> {
        let url = self.resolve(target);
        tracing::debug!("POST {}", url);
        let response = self
            .authorize(HTTP_CLIENT.post(&url).json(&body))
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;
        into_api_response(response).await
    }
}

async fn into_api_response(response: reqwest::Response) -> Result<ApiResponse> {
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    let text = response
        .text()
        .await
        .context("Failed to read response body")?;
    // Error pages are not always JSON; keep going with a null body.
    let body = if text.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::debug!("Response body is not JSON ({}), ignoring it", e);
            serde_json::Value::Null
        })
    };

    Ok(ApiResponse {
        status,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = ApiResponse::new(200, json!([])).with_header("X-Hits", "12");
        assert_eq!(response.header("x-hits"), Some("12"));
        assert_eq!(response.header("X-HITS"), Some("12"));
        assert_eq!(response.header("Link"), None);
    }

    #[test]
    fn test_error_detail() {
        let response = ApiResponse::new(400, json!({"detail": "Invalid query"}));
        assert_eq!(response.error_detail().as_deref(), Some("Invalid query"));
        assert_eq!(ApiResponse::new(500, json!(null)).error_detail(), None);
        assert_eq!(ApiResponse::new(500, json!({"detail": "  "})).error_detail(), None);
    }

    #[test]
    fn test_resolve_keeps_absolute_urls() {
        let transport = ReqwestTransport::new("https://example.com/api/0/", None);
        assert_eq!(
            transport.resolve("/projects/acme/web/issues/"),
            "https://example.com/api/0/projects/acme/web/issues/"
        );
        assert_eq!(
            transport.resolve("https://example.com/api/0/projects/acme/web/issues/?cursor=x"),
            "https://example.com/api/0/projects/acme/web/issues/?cursor=x"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let transport = ReqwestTransport::new("https://example.com", Some("secret".into()));
        let debug = format!("{:?}", transport);
        assert!(!debug.contains("secret"));
    }
}
