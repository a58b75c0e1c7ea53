use crate::domain_model::FamilyId;
use crate::domain_port::{Clock, FamilyStoreError, RevocationList};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// In-process blacklist. Entries carry their own deadline; lookups treat a
/// lapsed entry as absent even before the sweeper removes it.
pub struct MemoryRevocationList {
    deadlines: DashMap<FamilyId, DateTime<Utc>>,
    clock: Arc<dyn Clock>,
}

impl MemoryRevocationList {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        MemoryRevocationList {
            deadlines: DashMap::new(),
            clock,
        }
    }
}

#[async_trait::async_trait]
impl RevocationList for MemoryRevocationList {
    async fn insert(&self, family_id: FamilyId, ttl_secs: u64) -> Result<(), FamilyStoreError> {
        let deadline = self.clock.now() + Duration::seconds(ttl_secs as i64);
        self.deadlines.insert(family_id, deadline);
        Ok(())
    }

    async fn contains(&self, family_id: FamilyId) -> Result<bool, FamilyStoreError> {
        match self.deadlines.get(&family_id) {
            Some(deadline) => Ok(self.clock.now() < *deadline),
            None => Ok(false),
        }
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, FamilyStoreError> {
        let before = self.deadlines.len();
        self.deadlines.retain(|_, deadline| now < *deadline);
        Ok((before - self.deadlines.len()) as u64)
    }
}
