use crate::domain_model::FamilyId;
use crate::domain_port::{FamilyStoreError, RevocationList};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

pub struct RedisRevocationList {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisRevocationList {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisRevocationList {
            conn,
            prefix: prefix.into(),
        }
    }

    fn key(&self, family_id: FamilyId) -> String {
        format!("{}:revoked:{}", self.prefix, family_id)
    }

    fn store_err(e: redis::RedisError) -> FamilyStoreError {
        FamilyStoreError::Backend(e.to_string())
    }
}

#[async_trait::async_trait]
impl RevocationList for RedisRevocationList {
    async fn insert(&self, family_id: FamilyId, ttl_secs: u64) -> Result<(), FamilyStoreError> {
        let key = self.key(family_id);
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(&key, 1u8, ttl_secs)
            .await
            .map_err(Self::store_err)?;
        Ok(())
    }

    async fn contains(&self, family_id: FamilyId) -> Result<bool, FamilyStoreError> {
        let key = self.key(family_id);
        let mut conn = self.conn.clone();
        conn.exists(&key).await.map_err(Self::store_err)
    }

    async fn cleanup_expired(&self, _now: DateTime<Utc>) -> Result<u64, FamilyStoreError> {
        // entries carry their own EX ttl
        Ok(0)
    }
}
