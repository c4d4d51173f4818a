//! HTTP implementation of the network proxy collaborator.
//!
//! With a relay endpoint configured, requests are POSTed there as
//! `{"url": ..}` and the relay answers `{"content", "contentType", "error"}`.
//! Without one, pages are fetched directly.

use async_trait::async_trait;
use boltstudio_core::error::ToolError;
use boltstudio_core::sandbox::{FetchedPage, WebProxy};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub struct HttpProxy {
    client: reqwest::Client,
    relay_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpProxy {
    pub fn new(relay_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("boltstudio/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, relay_url }
    }

    fn failed(url: &str, reason: impl ToString) -> ToolError {
        ToolError::FetchFailed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    async fn fetch_via_relay(&self, relay: &str, url: &str) -> Result<FetchedPage, ToolError> {
        let response = self
            .client
            .post(relay)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|e| Self::failed(url, e))?;

        let relay_response: RelayResponse = response
            .json()
            .await
            .map_err(|e| ToolError::InvalidResponse(e.to_string()))?;

        if let Some(error) = relay_response.error {
            return Err(Self::failed(url, error));
        }

        Ok(FetchedPage {
            content: relay_response.content.unwrap_or_default(),
            content_type: relay_response.content_type,
        })
    }

    async fn fetch_direct(&self, url: &str) -> Result<FetchedPage, ToolError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::failed(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::failed(url, format!("HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let content = response.text().await.map_err(|e| Self::failed(url, e))?;
        Ok(FetchedPage {
            content,
            content_type,
        })
    }
}

#[async_trait]
impl WebProxy for HttpProxy {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ToolError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Self::failed(url, "URL must start with http:// or https://"));
        }

        debug!(url = %url, relay = self.relay_url.is_some(), "Fetching page");
        match &self.relay_url {
            Some(relay) => self.fetch_via_relay(relay, url).await,
            None => self.fetch_direct(url).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_http_urls_are_rejected_before_any_request() {
        let proxy = HttpProxy::new(None);
        let err = proxy.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, ToolError::FetchFailed { .. }));
    }

    #[test]
    fn relay_response_shape() {
        let parsed: RelayResponse =
            serde_json::from_str(r#"{"content":"<p>hi</p>","contentType":"text/html"}"#).unwrap();
        assert_eq!(parsed.content.as_deref(), Some("<p>hi</p>"));
        assert_eq!(parsed.content_type.as_deref(), Some("text/html"));
        assert!(parsed.error.is_none());

        let failed: RelayResponse = serde_json::from_str(r#"{"error":"blocked"}"#).unwrap();
        assert_eq!(failed.error.as_deref(), Some("blocked"));
    }
}
