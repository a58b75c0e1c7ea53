use super::SubjectId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct FamilyId(pub uuid::Uuid);

impl FamilyId {
    pub fn generate() -> Self {
        FamilyId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for FamilyId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(FamilyId)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// Claims carried by an issued token. The codec owns the wire encoding;
/// this is the decoded, typed view the rest of the engine works with.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TokenClaims {
    pub subject_id: SubjectId,
    pub scopes: BTreeSet<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub family_id: FamilyId,
    pub kind: TokenKind,
    pub jti: String,
}

impl TokenClaims {
    /// Schema validity as required at issue time. Expiry relative to the
    /// current clock is the codec's concern, not checked here.
    pub fn is_well_formed(&self) -> bool {
        !self.subject_id.is_nil() && !self.jti.is_empty() && self.expires_at > self.issued_at
    }

    pub fn lifetime(&self) -> Duration {
        self.expires_at - self.issued_at
    }
}
