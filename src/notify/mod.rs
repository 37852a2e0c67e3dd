//! Lead notification relay — forwards captured leads to a push service.

pub mod pushplus;
pub mod routes;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::NotifyError;

pub use pushplus::PushPlusClient;
pub use routes::notify_routes;

/// Fixed title of every lead notification.
pub const NOTIFY_TITLE: &str = "💰 新留学线索到账！";

/// Captured-lead payload accepted by the relay endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyRequest {
    pub phone: String,
    pub country: String,
    pub gpa: String,
}

/// Outbound push transport. One call per notification, stateless; safe to
/// invoke concurrently.
#[async_trait]
pub trait PushClient: Send + Sync {
    /// Deliver a plain-text message; returns the service's response body
    /// verbatim.
    async fn push(
        &self,
        token: &SecretString,
        title: &str,
        content: &str,
    ) -> Result<serde_json::Value, NotifyError>;
}

/// Build the fixed-template message body. The destination accepts plain
/// text, so the fields are embedded verbatim.
pub fn format_lead_message(req: &NotifyRequest) -> String {
    format!(
        "手机号：{}\n意向国家：{}\nGPA信息：{}",
        req.phone, req.country, req.gpa
    )
}

/// Masked form of the credential for logs: first four characters plus `****`.
/// The full value must never appear in logs or responses.
pub fn mask_token(token: &SecretString) -> String {
    let raw = token.expose_secret();
    let prefix: String = raw.chars().take(4).collect();
    format!("{prefix}****")
}
