use crate::application_port::{AuthError, CredentialHasher};
use crate::domain_model::{Principal, SubjectId};
use crate::domain_port::IdentityVerifier;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

struct IdentityRow {
    subject_id: SubjectId,
    password_hash: String,
    scopes: BTreeSet<String>,
}

/// In-process identity store for tests and demos. Production deployments
/// point the engine at their own `IdentityVerifier`.
pub struct MemoryIdentityVerifier {
    rows: DashMap<String, IdentityRow>,
    hasher: Arc<dyn CredentialHasher>,
}

impl MemoryIdentityVerifier {
    pub fn new(hasher: Arc<dyn CredentialHasher>) -> Self {
        MemoryIdentityVerifier {
            rows: DashMap::new(),
            hasher,
        }
    }

    pub async fn register(
        &self,
        identifier: &str,
        secret: &str,
        scopes: impl IntoIterator<Item = String>,
    ) -> Result<SubjectId, AuthError> {
        let subject_id = SubjectId(uuid::Uuid::new_v4());
        let password_hash = self.hasher.hash_password(secret).await?;
        self.rows.insert(
            identifier.to_string(),
            IdentityRow {
                subject_id,
                password_hash,
                scopes: scopes.into_iter().collect(),
            },
        );
        Ok(subject_id)
    }
}

#[async_trait::async_trait]
impl IdentityVerifier for MemoryIdentityVerifier {
    async fn verify_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Principal, AuthError> {
        let (subject_id, password_hash, scopes) = match self.rows.get(identifier) {
            Some(row) => (
                row.subject_id,
                row.password_hash.clone(),
                row.scopes.clone(),
            ),
            None => return Err(AuthError::InvalidCredentials),
        };

        if !self.hasher.verify_password(secret, &password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(Principal {
            subject_id,
            scopes,
        })
    }
}
