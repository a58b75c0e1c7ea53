use crate::domain_model::{TokenClaims, TokenKind};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("token malformed")]
    Malformed,
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("token expired")]
    Expired,
    #[error("claims rejected: {0}")]
    Encoding(String),
}

/// Stateless encode/verify of signed tokens. Implementations never touch
/// the family store; access-token checks stay store-free by design.
#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    async fn issue(&self, claims: &TokenClaims) -> Result<String, CodecError>;
    async fn verify(&self, token: &str, expected: TokenKind) -> Result<TokenClaims, CodecError>;
}
