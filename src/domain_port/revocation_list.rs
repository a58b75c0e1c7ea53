use super::FamilyStoreError;
use crate::domain_model::FamilyId;
use chrono::{DateTime, Utc};

/// Optional blacklist consulted during `authenticate` when the deployment
/// trades access-token statelessness for immediate revocation. Entries
/// expire with the tokens they shadow.
#[async_trait::async_trait]
pub trait RevocationList: Send + Sync {
    async fn insert(&self, family_id: FamilyId, ttl_secs: u64) -> Result<(), FamilyStoreError>;
    async fn contains(&self, family_id: FamilyId) -> Result<bool, FamilyStoreError>;
    /// Drop entries past their deadline; returns how many went away.
    /// Backends with native expiry may report 0.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, FamilyStoreError>;
}
