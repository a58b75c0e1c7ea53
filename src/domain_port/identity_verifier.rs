use crate::application_port::AuthError;
use crate::domain_model::Principal;

/// External identity collaborator. Must answer with a uniform
/// `InvalidCredentials` whether the identifier is unknown or the secret
/// wrong, so callers cannot enumerate accounts.
#[async_trait::async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Principal, AuthError>;
}
