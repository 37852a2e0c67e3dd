//! PushPlus transport — the concrete `PushClient`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::config::OUTBOUND_TIMEOUT;
use crate::error::NotifyError;
use crate::notify::PushClient;

/// PushPlus send endpoint.
const PUSHPLUS_SEND_URL: &str = "http://www.pushplus.plus/send";

/// HTTP client for the PushPlus `/send` API.
pub struct PushPlusClient {
    endpoint: String,
    client: reqwest::Client,
}

impl PushPlusClient {
    pub fn new() -> Self {
        Self::with_endpoint(PUSHPLUS_SEND_URL)
    }

    /// Point the client at a different endpoint (tests).
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::builder()
                .timeout(OUTBOUND_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for PushPlusClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushClient for PushPlusClient {
    async fn push(
        &self,
        token: &SecretString,
        title: &str,
        content: &str,
    ) -> Result<serde_json::Value, NotifyError> {
        // txt template: the destination renders plain text, nothing to escape
        let body = serde_json::json!({
            "token": token.expose_secret(),
            "title": title,
            "content": content,
            "template": "txt",
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NotifyError::InvalidResponse(e.to_string()))?;
        debug!("push delivered");
        Ok(data)
    }
}
