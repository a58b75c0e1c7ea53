use crate::domain_model::{FamilyId, RefreshRecord, SubjectId};
use crate::domain_port::{FamilyStore, FamilyStoreError};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;

/// The whole check-and-swap runs server-side so two rotations racing on
/// the same stale hash cannot both win.
const ROTATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 'unknown'
end
if redis.call('HGET', KEYS[1], 'revoked') == '1' then
  return 'revoked'
end
if redis.call('HGET', KEYS[1], 'current_hash') ~= ARGV[1] then
  redis.call('HSET', KEYS[1], 'revoked', '1')
  return 'reuse'
end
redis.call('HSET', KEYS[1], 'current_hash', ARGV[2])
redis.call('HINCRBY', KEYS[1], 'rotation_count', 1)
return 'ok'
"#;

/// Family records as Redis hashes with a TTL matching the refresh
/// lifetime, so expiry cleanup is native and `cleanup_expired` has
/// nothing to do.
pub struct RedisFamilyStore {
    conn: ConnectionManager,
    prefix: String,
    rotate_script: Script,
}

impl RedisFamilyStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisFamilyStore {
            conn,
            prefix: prefix.into(),
            rotate_script: Script::new(ROTATE_SCRIPT),
        }
    }

    fn key(&self, family_id: FamilyId) -> String {
        format!("{}:family:{}", self.prefix, family_id)
    }

    fn store_err(e: redis::RedisError) -> FamilyStoreError {
        FamilyStoreError::Backend(e.to_string())
    }

    fn record_from_map(
        family_id: FamilyId,
        map: HashMap<String, String>,
    ) -> Result<RefreshRecord, FamilyStoreError> {
        let field = |name: &str| {
            map.get(name)
                .cloned()
                .ok_or_else(|| FamilyStoreError::Backend(format!("missing field {}", name)))
        };
        let time = |s: String| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| FamilyStoreError::Backend(e.to_string()))
        };

        Ok(RefreshRecord {
            family_id,
            subject_id: field("subject_id")?
                .parse::<SubjectId>()
                .map_err(|e| FamilyStoreError::Backend(e.to_string()))?,
            current_hash: field("current_hash")?,
            issued_at: time(field("issued_at")?)?,
            expires_at: time(field("expires_at")?)?,
            revoked: field("revoked")? == "1",
            rotation_count: field("rotation_count")?
                .parse()
                .map_err(|e: std::num::ParseIntError| FamilyStoreError::Backend(e.to_string()))?,
        })
    }
}

#[async_trait::async_trait]
impl FamilyStore for RedisFamilyStore {
    async fn create_family(&self, record: RefreshRecord) -> Result<(), FamilyStoreError> {
        let key = self.key(record.family_id);
        let ttl = (record.expires_at - record.issued_at).num_seconds().max(1);
        let fields = [
            ("subject_id", record.subject_id.to_string()),
            ("current_hash", record.current_hash.clone()),
            ("issued_at", record.issued_at.to_rfc3339()),
            ("expires_at", record.expires_at.to_rfc3339()),
            ("revoked", if record.revoked { "1" } else { "0" }.to_string()),
            ("rotation_count", record.rotation_count.to_string()),
        ];

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(&key, &fields)
            .expire(&key, ttl)
            .query_async(&mut conn)
            .await
            .map_err(Self::store_err)?;
        Ok(())
    }

    async fn rotate(
        &self,
        family_id: FamilyId,
        old_hash: &str,
        new_hash: &str,
        _now: DateTime<Utc>,
    ) -> Result<RefreshRecord, FamilyStoreError> {
        let key = self.key(family_id);
        let mut conn = self.conn.clone();
        let status: String = self
            .rotate_script
            .key(&key)
            .arg(old_hash)
            .arg(new_hash)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::store_err)?;

        match status.as_str() {
            "ok" => self
                .get(family_id)
                .await?
                .ok_or(FamilyStoreError::UnknownFamily),
            "unknown" => Err(FamilyStoreError::UnknownFamily),
            "revoked" => Err(FamilyStoreError::FamilyRevoked),
            "reuse" => Err(FamilyStoreError::ReuseDetected),
            other => Err(FamilyStoreError::Backend(format!(
                "unexpected rotate status: {}",
                other
            ))),
        }
    }

    async fn revoke(&self, family_id: FamilyId) -> Result<(), FamilyStoreError> {
        let key = self.key(family_id);
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(&key).await.map_err(Self::store_err)?;
        if exists {
            let _: () = conn
                .hset(&key, "revoked", "1")
                .await
                .map_err(Self::store_err)?;
        }
        Ok(())
    }

    async fn is_revoked(&self, family_id: FamilyId) -> Result<bool, FamilyStoreError> {
        let key = self.key(family_id);
        let mut conn = self.conn.clone();
        let revoked: Option<String> = conn
            .hget(&key, "revoked")
            .await
            .map_err(Self::store_err)?;
        match revoked {
            Some(v) => Ok(v == "1"),
            None => Ok(true),
        }
    }

    async fn get(&self, family_id: FamilyId) -> Result<Option<RefreshRecord>, FamilyStoreError> {
        let key = self.key(family_id);
        let mut conn = self.conn.clone();
        let map: HashMap<String, String> =
            conn.hgetall(&key).await.map_err(Self::store_err)?;
        if map.is_empty() {
            return Ok(None);
        }
        Self::record_from_map(family_id, map).map(Some)
    }

    async fn cleanup_expired(&self, _now: DateTime<Utc>) -> Result<u64, FamilyStoreError> {
        // Redis expires family keys itself
        Ok(0)
    }
}
