//! Walks one full token lifecycle against the configured backends:
//! login, authenticate, rotate, reuse detection, logout.
//!
//! $ cargo run --bin grant_demo -- --settings=settings/dev.toml

use std::sync::Arc;
use tessera::application_port::GrantInput;
use tessera::domain::Argon2CredentialHasher;
use tessera::engine::Engine;
use tessera::infra_memory::MemoryIdentityVerifier;
use tessera::logger::*;
use tessera::settings::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    logger.reload_from_config(&LogConfig {
        filter: project_settings.log.filter.clone(),
    })?;

    let identity = Arc::new(MemoryIdentityVerifier::new(Arc::new(
        Argon2CredentialHasher,
    )));
    identity
        .register("alice", "correct horse", ["api.read".to_string()])
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    let engine = Engine::try_new(&project_settings, identity).await?;
    let service = engine.grant_service.clone();

    let granted = service
        .password_grant(GrantInput {
            identifier: "alice".to_string(),
            secret: "correct horse".to_string(),
        })
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    info!(subject = %granted.subject_id, family = %granted.tokens.family_id, "logged in");

    let principal = service
        .authenticate(Some(&granted.tokens.access_token.0))
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    info!(subject = %principal.subject_id, scopes = ?principal.scopes, "access token accepted");

    let rotated = service
        .refresh_grant(&granted.tokens.refresh_token.0)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    info!(family = %rotated.family_id, "refresh token rotated");

    // replaying the superseded refresh token must revoke the family
    let replay = service.refresh_grant(&granted.tokens.refresh_token.0).await;
    info!(outcome = ?replay.map(|_| ()), "replayed superseded refresh token");

    let after_reuse = service.refresh_grant(&rotated.refresh_token.0).await;
    info!(outcome = ?after_reuse.map(|_| ()), "current token after reuse detection");

    service
        .logout(granted.tokens.family_id)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    info!(family = %granted.tokens.family_id, "logged out");

    engine.shutdown().await;
    Ok(())
}
