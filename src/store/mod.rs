//! Lead persistence.

pub mod supabase;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::funnel::model::LeadRecord;

pub use supabase::SupabaseStore;

/// Destination for captured leads. Insert-only; this system never reads,
/// updates, or deletes a record.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn insert_lead(&self, record: &LeadRecord) -> Result<(), StoreError>;
}
