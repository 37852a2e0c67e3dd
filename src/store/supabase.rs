//! Supabase REST backend for the lead store.
//!
//! One call shape: `POST {url}/rest/v1/leads` with the project's anon key.
//! When the connection values are absent the store degrades to non-functional
//! (every insert fails with `NotConfigured`) instead of refusing to start.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, warn};

use crate::config::OUTBOUND_TIMEOUT;
use crate::error::StoreError;
use crate::funnel::model::LeadRecord;
use crate::store::LeadStore;

/// Table the leads land in.
const LEADS_TABLE: &str = "leads";

#[derive(Clone)]
struct SupabaseCreds {
    base_url: String,
    anon_key: String,
}

/// Supabase-backed lead store.
pub struct SupabaseStore {
    creds: Option<SupabaseCreds>,
    client: reqwest::Client,
}

impl SupabaseStore {
    /// Build from explicit connection values.
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            creds: Some(SupabaseCreds {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                anon_key: anon_key.into(),
            }),
            client: http_client(),
        }
    }

    /// Build from `SUPABASE_URL` / `SUPABASE_ANON_KEY`. Missing values log a
    /// warning and yield a degraded store rather than a startup failure.
    pub fn from_env() -> Self {
        let base_url = std::env::var("SUPABASE_URL").ok().filter(|v| !v.is_empty());
        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .ok()
            .filter(|v| !v.is_empty());

        match (base_url, anon_key) {
            (Some(base_url), Some(anon_key)) => Self::new(base_url, anon_key),
            _ => {
                warn!(
                    "SUPABASE_URL or SUPABASE_ANON_KEY is not set; lead persistence is disabled"
                );
                Self {
                    creds: None,
                    client: http_client(),
                }
            }
        }
    }

    /// Whether connection values are present.
    pub fn is_configured(&self) -> bool {
        self.creds.is_some()
    }
}

#[async_trait]
impl LeadStore for SupabaseStore {
    async fn insert_lead(&self, record: &LeadRecord) -> Result<(), StoreError> {
        let creds = self.creds.as_ref().ok_or(StoreError::NotConfigured)?;

        let url = format!("{}/rest/v1/{}", creds.base_url, LEADS_TABLE);
        let response = self
            .client
            .post(&url)
            .header("apikey", &creds.anon_key)
            .header(AUTHORIZATION, format!("Bearer {}", creds.anon_key))
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=minimal")
            .json(&[record])
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(table = LEADS_TABLE, "lead inserted");
        Ok(())
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(OUTBOUND_TIMEOUT)
        .build()
        .unwrap_or_default()
}
