use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct SubjectId(pub uuid::Uuid);

impl SubjectId {
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SubjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(SubjectId)
    }
}

/// An authenticated caller as seen by protected resources. Owned by the
/// external identity store; this crate only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub subject_id: SubjectId,
    pub scopes: BTreeSet<String>,
}

impl Principal {
    pub fn new(subject_id: SubjectId, scopes: impl IntoIterator<Item = String>) -> Self {
        Principal {
            subject_id,
            scopes: scopes.into_iter().collect(),
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}
