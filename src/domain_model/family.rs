use super::{FamilyId, SubjectId};
use chrono::{DateTime, Utc};

/// One refresh-token lineage, created at login and advanced on every
/// rotation. Only the SHA-256 fingerprint of the current refresh token is
/// kept; the token itself is never stored.
#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub family_id: FamilyId,
    pub subject_id: SubjectId,
    pub current_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub rotation_count: u32,
}

impl RefreshRecord {
    pub fn new(
        family_id: FamilyId,
        subject_id: SubjectId,
        current_hash: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        RefreshRecord {
            family_id,
            subject_id,
            current_hash: current_hash.into(),
            issued_at,
            expires_at,
            revoked: false,
            rotation_count: 0,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// A record accepts a rotation only while live and holding the hash
    /// being rotated away from.
    pub fn is_current(&self, hash: &str, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired(now) && self.current_hash == hash
    }
}
