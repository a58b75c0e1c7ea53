use crate::domain_model::{FamilyId, RefreshRecord};
use crate::domain_port::{FamilyStore, FamilyStoreError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// In-process family store. The map's per-entry lock makes `rotate` an
/// atomic compare-and-swap, which is all the concurrency contract asks
/// for.
#[derive(Default)]
pub struct MemoryFamilyStore {
    families: DashMap<FamilyId, RefreshRecord>,
}

impl MemoryFamilyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

#[async_trait::async_trait]
impl FamilyStore for MemoryFamilyStore {
    async fn create_family(&self, record: RefreshRecord) -> Result<(), FamilyStoreError> {
        self.families.insert(record.family_id, record);
        Ok(())
    }

    async fn rotate(
        &self,
        family_id: FamilyId,
        old_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshRecord, FamilyStoreError> {
        let mut entry = self
            .families
            .get_mut(&family_id)
            .ok_or(FamilyStoreError::UnknownFamily)?;

        if entry.revoked {
            return Err(FamilyStoreError::FamilyRevoked);
        }
        if entry.is_expired(now) {
            return Err(FamilyStoreError::FamilyRevoked);
        }
        if entry.current_hash != old_hash {
            entry.revoked = true;
            return Err(FamilyStoreError::ReuseDetected);
        }

        entry.current_hash = new_hash.to_string();
        entry.rotation_count += 1;
        Ok(entry.value().clone())
    }

    async fn revoke(&self, family_id: FamilyId) -> Result<(), FamilyStoreError> {
        if let Some(mut entry) = self.families.get_mut(&family_id) {
            entry.revoked = true;
        }
        Ok(())
    }

    async fn is_revoked(&self, family_id: FamilyId) -> Result<bool, FamilyStoreError> {
        Ok(self
            .families
            .get(&family_id)
            .map(|r| r.revoked)
            .unwrap_or(true))
    }

    async fn get(&self, family_id: FamilyId) -> Result<Option<RefreshRecord>, FamilyStoreError> {
        Ok(self.families.get(&family_id).map(|r| r.value().clone()))
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, FamilyStoreError> {
        let before = self.families.len();
        self.families.retain(|_, record| !record.is_expired(now));
        Ok((before - self.families.len()) as u64)
    }
}
