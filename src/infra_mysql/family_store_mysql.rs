use crate::domain_model::{FamilyId, RefreshRecord, SubjectId};
use crate::domain_port::{FamilyStore, FamilyStoreError};
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use uuid::Uuid;

pub struct MySqlFamilyStore {
    pool: MySqlPool,
}

impl MySqlFamilyStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlFamilyStore { pool }
    }

    #[inline]
    fn id_as_bytes(id: &Uuid) -> &[u8] {
        id.as_bytes()
    }

    #[inline]
    fn id_from_bytes(bytes: &[u8]) -> Result<Uuid, FamilyStoreError> {
        Uuid::from_slice(bytes).map_err(|e| FamilyStoreError::Backend(e.to_string()))
    }

    fn store_err(e: sqlx::Error) -> FamilyStoreError {
        FamilyStoreError::Backend(e.to_string())
    }

    fn row_to_record(row: MySqlRow) -> Result<RefreshRecord, FamilyStoreError> {
        let family_bytes: Vec<u8> = row.try_get("family_id").map_err(Self::store_err)?;
        let subject_bytes: Vec<u8> = row.try_get("subject_id").map_err(Self::store_err)?;

        Ok(RefreshRecord {
            family_id: FamilyId(Self::id_from_bytes(&family_bytes)?),
            subject_id: SubjectId(Self::id_from_bytes(&subject_bytes)?),
            current_hash: row.try_get("current_hash").map_err(Self::store_err)?,
            issued_at: row.try_get("issued_at").map_err(Self::store_err)?,
            expires_at: row.try_get("expires_at").map_err(Self::store_err)?,
            revoked: row.try_get("revoked").map_err(Self::store_err)?,
            rotation_count: row
                .try_get::<u32, _>("rotation_count")
                .map_err(Self::store_err)?,
        })
    }
}

#[async_trait::async_trait]
impl FamilyStore for MySqlFamilyStore {
    async fn create_family(&self, record: RefreshRecord) -> Result<(), FamilyStoreError> {
        sqlx::query(
            r#"
INSERT INTO refresh_family
    (family_id, subject_id, current_hash, issued_at, expires_at, revoked, rotation_count)
VALUES (?, ?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(Self::id_as_bytes(&record.family_id.0))
        .bind(Self::id_as_bytes(&record.subject_id.0))
        .bind(&record.current_hash)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.rotation_count)
        .execute(&self.pool)
        .await
        .map_err(Self::store_err)?;

        Ok(())
    }

    async fn rotate(
        &self,
        family_id: FamilyId,
        old_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshRecord, FamilyStoreError> {
        // The conditional UPDATE is the compare-and-swap; rows_affected
        // tells us whether we won.
        let result = sqlx::query(
            r#"
UPDATE refresh_family
SET current_hash = ?, rotation_count = rotation_count + 1
WHERE family_id = ? AND current_hash = ? AND revoked = 0 AND expires_at > ?
"#,
        )
        .bind(new_hash)
        .bind(Self::id_as_bytes(&family_id.0))
        .bind(old_hash)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Self::store_err)?;

        if result.rows_affected() == 1 {
            return self
                .get(family_id)
                .await?
                .ok_or(FamilyStoreError::UnknownFamily);
        }

        match self.get(family_id).await? {
            None => Err(FamilyStoreError::UnknownFamily),
            Some(r) if r.revoked || r.is_expired(now) => Err(FamilyStoreError::FamilyRevoked),
            Some(r) if r.current_hash != old_hash => {
                self.revoke(family_id).await?;
                Err(FamilyStoreError::ReuseDetected)
            }
            // the record looked rotatable on re-read, so our UPDATE lost
            // a momentary race
            Some(_) => Err(FamilyStoreError::Conflict),
        }
    }

    async fn revoke(&self, family_id: FamilyId) -> Result<(), FamilyStoreError> {
        sqlx::query("UPDATE refresh_family SET revoked = 1 WHERE family_id = ?")
            .bind(Self::id_as_bytes(&family_id.0))
            .execute(&self.pool)
            .await
            .map_err(Self::store_err)?;
        Ok(())
    }

    async fn is_revoked(&self, family_id: FamilyId) -> Result<bool, FamilyStoreError> {
        let row: Option<MySqlRow> =
            sqlx::query("SELECT revoked FROM refresh_family WHERE family_id = ?")
                .bind(Self::id_as_bytes(&family_id.0))
                .fetch_optional(&self.pool)
                .await
                .map_err(Self::store_err)?;

        match row {
            Some(row) => row.try_get("revoked").map_err(Self::store_err),
            None => Ok(true),
        }
    }

    async fn get(&self, family_id: FamilyId) -> Result<Option<RefreshRecord>, FamilyStoreError> {
        let row: Option<MySqlRow> = sqlx::query(
            r#"
SELECT family_id, subject_id, current_hash, issued_at, expires_at, revoked, rotation_count
FROM refresh_family
WHERE family_id = ?
"#,
        )
        .bind(Self::id_as_bytes(&family_id.0))
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::store_err)?;

        row.map(Self::row_to_record).transpose()
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, FamilyStoreError> {
        let result = sqlx::query("DELETE FROM refresh_family WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(Self::store_err)?;
        Ok(result.rows_affected())
    }
}
