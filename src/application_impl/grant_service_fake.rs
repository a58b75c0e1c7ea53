use crate::application_port::{
    AccessToken, AuthError, GrantInput, GrantResult, GrantService, RefreshToken, RejectReason,
    TokenPair,
};
use crate::domain_model::{FamilyId, Principal, SubjectId};
use chrono::{Duration, Utc};

#[derive(Debug)]
pub struct FakeGrantService;

impl FakeGrantService {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FakeGrantService {
    fn default() -> Self {
        Self::new()
    }
}

// Minimal fake implementation for basic use only.
// Extend to simulate more error cases and configurable responses when needed.
#[async_trait::async_trait]
impl GrantService for FakeGrantService {
    async fn password_grant(&self, request: GrantInput) -> Result<GrantResult, AuthError> {
        Ok(GrantResult {
            subject_id: fake_subject(&request.identifier),
            tokens: fake_pair(&request.identifier),
        })
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        if let Some(identifier) = refresh_token.strip_prefix("fake-refresh-token:") {
            Ok(fake_pair(identifier))
        } else {
            Err(AuthError::TokenInvalid)
        }
    }

    async fn logout(&self, _family_id: FamilyId) -> Result<(), AuthError> {
        Ok(())
    }

    async fn authenticate(&self, raw_token: Option<&str>) -> Result<Principal, RejectReason> {
        let token = raw_token.ok_or(RejectReason::Missing)?;
        if let Some(identifier) = token.strip_prefix("fake-access-token:") {
            Ok(Principal::new(fake_subject(identifier), []))
        } else {
            Err(RejectReason::Malformed)
        }
    }
}

fn fake_subject(identifier: &str) -> SubjectId {
    SubjectId(uuid::Uuid::new_v5(
        &uuid::Uuid::NAMESPACE_OID,
        identifier.as_bytes(),
    ))
}

fn fake_family(identifier: &str) -> FamilyId {
    FamilyId(uuid::Uuid::new_v5(
        &uuid::Uuid::NAMESPACE_OID,
        format!("family:{}", identifier).as_bytes(),
    ))
}

fn fake_pair(identifier: &str) -> TokenPair {
    let now = Utc::now();
    TokenPair {
        access_token: AccessToken(format!("fake-access-token:{}", identifier)),
        refresh_token: RefreshToken(format!("fake-refresh-token:{}", identifier)),
        access_token_expires_at: now + Duration::minutes(15),
        refresh_token_expires_at: now + Duration::days(30),
        family_id: fake_family(identifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_tokens_round_trip_by_identifier() {
        let fake = FakeGrantService::new();
        let granted = fake
            .password_grant(GrantInput {
                identifier: "alice".to_string(),
                secret: "ignored".to_string(),
            })
            .await
            .unwrap();

        let principal = fake
            .authenticate(Some(&granted.tokens.access_token.0))
            .await
            .unwrap();
        assert_eq!(principal.subject_id, granted.subject_id);

        let refreshed = fake
            .refresh_grant(&granted.tokens.refresh_token.0)
            .await
            .unwrap();
        assert_eq!(refreshed.family_id, granted.tokens.family_id);

        assert!(matches!(
            fake.refresh_grant("not-a-fake-token").await,
            Err(AuthError::TokenInvalid)
        ));
    }
}
