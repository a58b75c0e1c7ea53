use crate::application_port::{AuthError, CredentialHasher};
use crate::domain_model::{Principal, SubjectId};
use crate::domain_port::IdentityVerifier;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use std::sync::Arc;
use uuid::Uuid;

/// Credential lookup against an identity table this crate does not own.
/// Scopes are kept space-separated in the row, OAuth style.
pub struct MySqlIdentityVerifier {
    pool: MySqlPool,
    hasher: Arc<dyn CredentialHasher>,
}

impl MySqlIdentityVerifier {
    pub fn new(pool: MySqlPool, hasher: Arc<dyn CredentialHasher>) -> Self {
        MySqlIdentityVerifier { pool, hasher }
    }

    fn subject_from_row(row: &MySqlRow) -> Result<SubjectId, AuthError> {
        let bytes: Vec<u8> = row
            .try_get("subject_id")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(SubjectId(
            Uuid::from_slice(&bytes).map_err(|e| AuthError::Store(e.to_string()))?,
        ))
    }
}

#[async_trait::async_trait]
impl IdentityVerifier for MySqlIdentityVerifier {
    async fn verify_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Principal, AuthError> {
        let row: Option<MySqlRow> = sqlx::query(
            r#"
SELECT subject_id, password_hash, is_active, scopes
FROM identity_credential
WHERE identifier = ?
"#,
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        // every failure below collapses into the same answer
        let row = row.ok_or(AuthError::InvalidCredentials)?;

        let is_active: bool = row
            .try_get("is_active")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        if !is_active {
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash: String = row
            .try_get("password_hash")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        if !self.hasher.verify_password(secret, &password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        let subject_id = Self::subject_from_row(&row)?;
        let scopes: String = row
            .try_get("scopes")
            .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(Principal::new(
            subject_id,
            scopes.split_whitespace().map(str::to_string),
        ))
    }
}
