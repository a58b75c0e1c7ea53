use crate::domain_model::{FamilyId, RefreshRecord};
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum FamilyStoreError {
    /// The presented hash was superseded by a later rotation. The store
    /// has already revoked the family by the time this is returned.
    #[error("refresh token reuse detected")]
    ReuseDetected,
    #[error("token family revoked")]
    FamilyRevoked,
    #[error("unknown token family")]
    UnknownFamily,
    /// Transient loser of a backend race; safe to retry.
    #[error("concurrent rotation conflict")]
    Conflict,
    #[error("store error: {0}")]
    Backend(String),
}

/// Tracks refresh-token families. `rotate` must be atomic
/// compare-and-swap on the hash: of two concurrent rotations with the
/// same stale hash exactly one may win.
#[async_trait::async_trait]
pub trait FamilyStore: Send + Sync {
    /// Insert a new family record (rotation_count 0).
    async fn create_family(&self, record: RefreshRecord) -> Result<(), FamilyStoreError>;

    /// Swap `old_hash` for `new_hash` if the record is live and current.
    /// A live record holding a different hash means the presented token
    /// was already rotated away: the family is revoked and
    /// `ReuseDetected` returned.
    async fn rotate(
        &self,
        family_id: FamilyId,
        old_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshRecord, FamilyStoreError>;

    /// Mark the family revoked. Idempotent; unknown families are fine.
    async fn revoke(&self, family_id: FamilyId) -> Result<(), FamilyStoreError>;

    /// Unknown families count as revoked.
    async fn is_revoked(&self, family_id: FamilyId) -> Result<bool, FamilyStoreError>;

    async fn get(&self, family_id: FamilyId) -> Result<Option<RefreshRecord>, FamilyStoreError>;

    /// Delete expired records; returns how many went away.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, FamilyStoreError>;
}
