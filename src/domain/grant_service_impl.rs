use crate::application_port::{
    AccessToken, AuthError, CodecError, GrantInput, GrantResult, GrantService, RefreshToken,
    RejectReason, TokenCodec, TokenPair,
};
use crate::domain::token_fingerprint;
use crate::domain_model::{FamilyId, Principal, RefreshRecord, SubjectId, TokenClaims, TokenKind};
use crate::domain_port::{Clock, FamilyStore, FamilyStoreError, IdentityVerifier, RevocationList};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TokenPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        TokenPolicy {
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

pub struct TokenGrantService {
    identity: Arc<dyn IdentityVerifier>,
    codec: Arc<dyn TokenCodec>,
    families: Arc<dyn FamilyStore>,
    blacklist: Arc<dyn RevocationList>,
    clock: Arc<dyn Clock>,
    policy: TokenPolicy,
    check_blacklist: bool,
}

impl TokenGrantService {
    pub fn new(
        identity: Arc<dyn IdentityVerifier>,
        codec: Arc<dyn TokenCodec>,
        families: Arc<dyn FamilyStore>,
        blacklist: Arc<dyn RevocationList>,
        clock: Arc<dyn Clock>,
        policy: TokenPolicy,
        check_blacklist: bool,
    ) -> Self {
        Self {
            identity,
            codec,
            families,
            blacklist,
            clock,
            policy,
            check_blacklist,
        }
    }

    #[inline]
    fn new_jti() -> String {
        Uuid::new_v4().to_string()
    }

    fn ttl_secs(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
        let secs = (until - now).num_seconds();
        if secs <= 0 { 1 } else { secs as u64 }
    }

    fn map_store(e: FamilyStoreError) -> AuthError {
        match e {
            // A deleted family and a revoked one must look the same to a
            // token holder.
            FamilyStoreError::ReuseDetected
            | FamilyStoreError::FamilyRevoked
            | FamilyStoreError::UnknownFamily => AuthError::FamilyRevoked,
            FamilyStoreError::Conflict => AuthError::Conflict,
            FamilyStoreError::Backend(e) => AuthError::Store(e),
        }
    }

    fn claims(
        &self,
        subject_id: SubjectId,
        scopes: &BTreeSet<String>,
        family_id: FamilyId,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> TokenClaims {
        let ttl = match kind {
            TokenKind::Access => self.policy.access_ttl,
            TokenKind::Refresh => self.policy.refresh_ttl,
        };
        TokenClaims {
            subject_id,
            scopes: scopes.clone(),
            issued_at: now,
            expires_at: now + ttl,
            family_id,
            kind,
            jti: Self::new_jti(),
        }
    }

    /// Issue an access+refresh pair sharing `family_id`. Returns the pair
    /// and the fingerprint of the refresh token for the family store.
    async fn mint_pair(
        &self,
        subject_id: SubjectId,
        scopes: &BTreeSet<String>,
        family_id: FamilyId,
        now: DateTime<Utc>,
    ) -> Result<(TokenPair, String), AuthError> {
        let access_claims = self.claims(subject_id, scopes, family_id, TokenKind::Access, now);
        let refresh_claims = self.claims(subject_id, scopes, family_id, TokenKind::Refresh, now);

        let access = self
            .codec
            .issue(&access_claims)
            .await
            .map_err(|e| AuthError::InternalError(e.to_string()))?;
        let refresh = self
            .codec
            .issue(&refresh_claims)
            .await
            .map_err(|e| AuthError::InternalError(e.to_string()))?;

        let refresh_hash = token_fingerprint(&refresh);
        let pair = TokenPair {
            access_token: AccessToken(access),
            refresh_token: RefreshToken(refresh),
            access_token_expires_at: access_claims.expires_at,
            refresh_token_expires_at: refresh_claims.expires_at,
            family_id,
        };
        Ok((pair, refresh_hash))
    }
}

#[async_trait::async_trait]
impl GrantService for TokenGrantService {
    async fn password_grant(&self, request: GrantInput) -> Result<GrantResult, AuthError> {
        let principal = self
            .identity
            .verify_credentials(&request.identifier, &request.secret)
            .await?;

        let now = self.clock.now();
        let family_id = FamilyId::generate();
        let (pair, refresh_hash) = self
            .mint_pair(principal.subject_id, &principal.scopes, family_id, now)
            .await?;

        let record = RefreshRecord::new(
            family_id,
            principal.subject_id,
            refresh_hash,
            now,
            pair.refresh_token_expires_at,
        );
        self.families
            .create_family(record)
            .await
            .map_err(Self::map_store)?;

        debug!(subject = %principal.subject_id, family = %family_id, "issued token pair");
        Ok(GrantResult {
            subject_id: principal.subject_id,
            tokens: pair,
        })
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .codec
            .verify(refresh_token, TokenKind::Refresh)
            .await
            .map_err(|e| match e {
                CodecError::Expired => AuthError::TokenExpired,
                CodecError::Encoding(e) => AuthError::InternalError(e),
                CodecError::Malformed | CodecError::SignatureInvalid => AuthError::TokenInvalid,
            })?;

        let old_hash = token_fingerprint(refresh_token);
        let now = self.clock.now();
        let (pair, new_hash) = self
            .mint_pair(claims.subject_id, &claims.scopes, claims.family_id, now)
            .await?;

        let mut retried = false;
        loop {
            match self
                .families
                .rotate(claims.family_id, &old_hash, &new_hash, now)
                .await
            {
                Ok(record) => {
                    debug!(
                        family = %claims.family_id,
                        rotation = record.rotation_count,
                        "rotated refresh token"
                    );
                    break;
                }
                Err(FamilyStoreError::Conflict) if !retried => {
                    retried = true;
                }
                Err(FamilyStoreError::ReuseDetected) => {
                    warn!(
                        family = %claims.family_id,
                        "superseded refresh token presented; family revoked"
                    );
                    let ttl = Self::ttl_secs(claims.expires_at, now);
                    if let Err(e) = self.blacklist.insert(claims.family_id, ttl).await {
                        warn!(family = %claims.family_id, error = %e, "blacklist insert failed");
                    }
                    return Err(AuthError::FamilyRevoked);
                }
                Err(e) => return Err(Self::map_store(e)),
            }
        }
        Ok(pair)
    }

    async fn logout(&self, family_id: FamilyId) -> Result<(), AuthError> {
        let now = self.clock.now();
        let record = self
            .families
            .get(family_id)
            .await
            .map_err(Self::map_store)?;
        self.families
            .revoke(family_id)
            .await
            .map_err(Self::map_store)?;

        let ttl = match record {
            Some(r) => Self::ttl_secs(r.expires_at, now),
            None => self.policy.refresh_ttl.as_secs(),
        };
        self.blacklist
            .insert(family_id, ttl)
            .await
            .map_err(Self::map_store)?;

        debug!(family = %family_id, "family revoked");
        Ok(())
    }

    async fn authenticate(&self, raw_token: Option<&str>) -> Result<Principal, RejectReason> {
        let token = raw_token.ok_or(RejectReason::Missing)?;

        let claims = self
            .codec
            .verify(token, TokenKind::Access)
            .await
            .map_err(|e| match e {
                CodecError::Expired => RejectReason::Expired,
                CodecError::SignatureInvalid => RejectReason::SignatureInvalid,
                CodecError::Malformed | CodecError::Encoding(_) => RejectReason::Malformed,
            })?;

        if self.check_blacklist {
            match self.blacklist.contains(claims.family_id).await {
                Ok(false) => {}
                Ok(true) => return Err(RejectReason::Revoked),
                Err(e) => {
                    // fail closed: an unreadable blacklist must not admit
                    // a possibly revoked token
                    warn!(family = %claims.family_id, error = %e, "blacklist lookup failed");
                    return Err(RejectReason::Revoked);
                }
            }
        }

        Ok(Principal::new(claims.subject_id, claims.scopes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Argon2CredentialHasher, CodecConfig, JwtCodec};
    use crate::domain_port::ManualClock;
    use crate::infra_memory::{
        MemoryFamilyStore, MemoryIdentityVerifier, MemoryRevocationList,
    };
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Harness {
        service: Arc<TokenGrantService>,
        clock: Arc<ManualClock>,
        families: Arc<MemoryFamilyStore>,
    }

    async fn harness(check_blacklist: bool) -> Harness {
        harness_with(check_blacklist, None).await
    }

    async fn harness_with(
        check_blacklist: bool,
        families_override: Option<Arc<dyn FamilyStore>>,
    ) -> Harness {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let codec = Arc::new(JwtCodec::new(
            CodecConfig {
                issuer: "tessera.test".to_string(),
                audience: "api".to_string(),
                leeway_secs: 30,
                active_key_id: "k1".to_string(),
                keys: HashMap::from([("k1".to_string(), b"test-secret".to_vec())]),
            },
            clock.clone(),
        ));

        let identity = Arc::new(MemoryIdentityVerifier::new(Arc::new(
            Argon2CredentialHasher,
        )));
        identity
            .register("alice", "correct horse", ["chat.read".to_string()])
            .await
            .unwrap();

        let families = Arc::new(MemoryFamilyStore::new());
        let blacklist = Arc::new(MemoryRevocationList::new(clock.clone()));

        let service = Arc::new(TokenGrantService::new(
            identity,
            codec,
            families_override.unwrap_or_else(|| families.clone()),
            blacklist,
            clock.clone(),
            TokenPolicy::default(),
            check_blacklist,
        ));
        Harness {
            service,
            clock,
            families,
        }
    }

    async fn login(h: &Harness) -> GrantResult {
        h.service
            .password_grant(GrantInput {
                identifier: "alice".to_string(),
                secret: "correct horse".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn password_grant_issues_pair_with_configured_lifetimes() {
        let h = harness(false).await;
        let now = h.clock.now();
        let granted = login(&h).await;

        let pair = &granted.tokens;
        assert_eq!(
            (pair.access_token_expires_at - now).num_seconds(),
            15 * 60
        );
        assert_eq!(
            (pair.refresh_token_expires_at - now).num_seconds(),
            30 * 24 * 60 * 60
        );

        let second = login(&h).await;
        assert_ne!(pair.family_id, second.tokens.family_id);
    }

    #[tokio::test]
    async fn bad_credentials_are_uniform() {
        let h = harness(false).await;

        let wrong_password = h
            .service
            .password_grant(GrantInput {
                identifier: "alice".to_string(),
                secret: "wrong".to_string(),
            })
            .await;
        let unknown_user = h
            .service
            .password_grant(GrantInput {
                identifier: "mallory".to_string(),
                secret: "whatever".to_string(),
            })
            .await;

        assert!(matches!(wrong_password, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown_user, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn refresh_rotates_within_the_same_family() {
        let h = harness(false).await;
        let granted = login(&h).await;

        let next = h
            .service
            .refresh_grant(&granted.tokens.refresh_token.0)
            .await
            .unwrap();
        assert_eq!(next.family_id, granted.tokens.family_id);
        assert_ne!(next.refresh_token.0, granted.tokens.refresh_token.0);
    }

    #[tokio::test]
    async fn only_the_latest_refresh_token_rotates() {
        let h = harness(false).await;
        let granted = login(&h).await;

        let mut tokens = vec![granted.tokens.refresh_token.0.clone()];
        for _ in 0..3 {
            let pair = h.service.refresh_grant(tokens.last().unwrap()).await.unwrap();
            tokens.push(pair.refresh_token.0);
        }

        // every superseded token now trips reuse detection
        let stale = &tokens[1];
        assert!(matches!(
            h.service.refresh_grant(stale).await,
            Err(AuthError::FamilyRevoked)
        ));
    }

    #[tokio::test]
    async fn reuse_revokes_the_entire_family() {
        let h = harness(false).await;
        let granted = login(&h).await;
        let r0 = granted.tokens.refresh_token.0.clone();

        let r1 = h.service.refresh_grant(&r0).await.unwrap().refresh_token.0;

        // replaying the superseded token kills the family...
        assert!(matches!(
            h.service.refresh_grant(&r0).await,
            Err(AuthError::FamilyRevoked)
        ));
        // ...including its current token
        assert!(matches!(
            h.service.refresh_grant(&r1).await,
            Err(AuthError::FamilyRevoked)
        ));
        assert!(h.families.is_revoked(granted.tokens.family_id).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_refresh_has_exactly_one_winner() {
        let h = harness(false).await;
        let granted = login(&h).await;
        let token = granted.tokens.refresh_token.0;

        let (a, b) = tokio::join!(
            h.service.refresh_grant(&token),
            h.service.refresh_grant(&token),
        );

        let wins = [a.is_ok(), b.is_ok()].iter().filter(|&&w| w).count();
        assert_eq!(wins, 1);
        for outcome in [a, b] {
            if let Err(e) = outcome {
                assert!(matches!(e, AuthError::FamilyRevoked | AuthError::Conflict));
            }
        }
    }

    #[tokio::test]
    async fn expired_refresh_token_is_rejected_as_expired() {
        let h = harness(false).await;
        let granted = login(&h).await;

        h.clock.advance(ChronoDuration::days(31));
        assert!(matches!(
            h.service
                .refresh_grant(&granted.tokens.refresh_token.0)
                .await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn authenticate_accepts_live_token_and_rejects_expired() {
        let h = harness(false).await;
        let granted = login(&h).await;
        let access = granted.tokens.access_token.0;

        let principal = h.service.authenticate(Some(&access)).await.unwrap();
        assert_eq!(principal.subject_id, granted.subject_id);
        assert!(principal.has_scope("chat.read"));

        // 16 minutes on a 15-minute token, well past the 30s leeway
        h.clock.advance(ChronoDuration::minutes(16));
        assert_eq!(
            h.service.authenticate(Some(&access)).await.unwrap_err(),
            RejectReason::Expired
        );
    }

    #[tokio::test]
    async fn authenticate_rejects_missing_and_malformed() {
        let h = harness(false).await;
        assert_eq!(
            h.service.authenticate(None).await.unwrap_err(),
            RejectReason::Missing
        );
        assert_eq!(
            h.service.authenticate(Some("garbage")).await.unwrap_err(),
            RejectReason::Malformed
        );
    }

    #[tokio::test]
    async fn logout_revokes_family_and_blacklists_access() {
        let h = harness(true).await;
        let granted = login(&h).await;
        let access = granted.tokens.access_token.0.clone();

        assert!(h.service.authenticate(Some(&access)).await.is_ok());

        h.service.logout(granted.tokens.family_id).await.unwrap();

        assert_eq!(
            h.service.authenticate(Some(&access)).await.unwrap_err(),
            RejectReason::Revoked
        );
        assert!(matches!(
            h.service
                .refresh_grant(&granted.tokens.refresh_token.0)
                .await,
            Err(AuthError::FamilyRevoked)
        ));
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let h = harness(false).await;
        let granted = login(&h).await;
        h.service.logout(granted.tokens.family_id).await.unwrap();
        h.service.logout(granted.tokens.family_id).await.unwrap();
    }

    #[tokio::test]
    async fn without_blacklist_access_tokens_stay_stateless() {
        let h = harness(false).await;
        let granted = login(&h).await;
        let access = granted.tokens.access_token.0.clone();

        h.service.logout(granted.tokens.family_id).await.unwrap();
        // verification never consults the store in this configuration
        assert!(h.service.authenticate(Some(&access)).await.is_ok());
    }

    /// Delegating store that loses one backend race before behaving.
    struct ConflictOnce {
        inner: MemoryFamilyStore,
        fired: AtomicBool,
    }

    #[async_trait::async_trait]
    impl FamilyStore for ConflictOnce {
        async fn create_family(&self, record: RefreshRecord) -> Result<(), FamilyStoreError> {
            self.inner.create_family(record).await
        }

        async fn rotate(
            &self,
            family_id: FamilyId,
            old_hash: &str,
            new_hash: &str,
            now: DateTime<Utc>,
        ) -> Result<RefreshRecord, FamilyStoreError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                return Err(FamilyStoreError::Conflict);
            }
            self.inner.rotate(family_id, old_hash, new_hash, now).await
        }

        async fn revoke(&self, family_id: FamilyId) -> Result<(), FamilyStoreError> {
            self.inner.revoke(family_id).await
        }

        async fn is_revoked(&self, family_id: FamilyId) -> Result<bool, FamilyStoreError> {
            self.inner.is_revoked(family_id).await
        }

        async fn get(
            &self,
            family_id: FamilyId,
        ) -> Result<Option<RefreshRecord>, FamilyStoreError> {
            self.inner.get(family_id).await
        }

        async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, FamilyStoreError> {
            self.inner.cleanup_expired(now).await
        }
    }

    #[tokio::test]
    async fn transient_conflict_is_retried_once() {
        let flaky = Arc::new(ConflictOnce {
            inner: MemoryFamilyStore::new(),
            fired: AtomicBool::new(false),
        });
        let h = harness_with(false, Some(flaky)).await;
        let granted = login(&h).await;

        // first rotate attempt hits the injected conflict, retry wins
        assert!(
            h.service
                .refresh_grant(&granted.tokens.refresh_token.0)
                .await
                .is_ok()
        );
    }
}
