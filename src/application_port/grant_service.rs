use crate::domain_model::{FamilyId, Principal, SubjectId};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token invalid")]
    TokenInvalid,
    #[error("token expired")]
    TokenExpired,
    #[error("token family revoked")]
    FamilyRevoked,
    #[error("concurrent refresh conflict")]
    Conflict,
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

/// Why `authenticate` turned a request away. This is the full vocabulary
/// exposed to the routing layer; anything finer stays internal.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    #[error("no token presented")]
    Missing,
    #[error("token malformed")]
    Malformed,
    #[error("token expired")]
    Expired,
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("token revoked")]
    Revoked,
}

#[derive(Debug, Clone)]
pub struct GrantInput {
    pub identifier: String,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub family_id: FamilyId,
}

#[derive(Debug, Clone)]
pub struct GrantResult {
    pub subject_id: SubjectId,
    pub tokens: TokenPair,
}

#[async_trait::async_trait]
pub trait GrantService: Send + Sync {
    /// Exchange credentials for a fresh token pair with its own family id.
    async fn password_grant(&self, request: GrantInput) -> Result<GrantResult, AuthError>;
    /// Exchange a refresh token for the next pair in the same family.
    /// Presenting a superseded token revokes the whole family.
    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;
    /// Revoke the family behind an issued pair. Idempotent.
    async fn logout(&self, family_id: FamilyId) -> Result<(), AuthError>;
    /// Gate for protected resources. Pure except for the optional
    /// blacklist lookup.
    async fn authenticate(&self, raw_token: Option<&str>) -> Result<Principal, RejectReason>;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, AuthError>;
}
