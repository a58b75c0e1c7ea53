use crate::application_port::{GrantService, TokenCodec};
use crate::domain::{CodecConfig, JwtCodec, TokenGrantService, TokenPolicy};
use crate::domain_port::{Clock, FamilyStore, IdentityVerifier, RevocationList, SystemClock};
use crate::infra_memory::{MemoryFamilyStore, MemoryRevocationList};
use crate::infra_mysql::MySqlFamilyStore;
use crate::infra_redis::{RedisFamilyStore, RedisRevocationList};
use crate::logger::*;
use crate::settings::Settings;
use sqlx::MySqlPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const KEY_PREFIX: &str = "tessera";
const ENV_SIGNING_KEY: &str = "TESSERA_SIGNING_KEY";

/// Wires the grant service against the configured backends and owns the
/// expiry sweeper. The identity verifier stays a caller-provided
/// collaborator; credentials are not this crate's data.
pub struct Engine {
    pub grant_service: Arc<dyn GrantService>,
    gc_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

fn signing_keys(settings: &Settings) -> HashMap<String, Vec<u8>> {
    let mut keys = HashMap::new();
    for kid in &settings.keys.retired {
        let var = format!("{}_{}", ENV_SIGNING_KEY, kid.to_uppercase().replace('-', "_"));
        match std::env::var(&var) {
            Ok(secret) => {
                keys.insert(kid.clone(), secret.into_bytes());
            }
            Err(_) => {
                warn!(kid = %kid, "no secret found for retired key; its tokens will not verify")
            }
        }
    }
    let active_secret = std::env::var(ENV_SIGNING_KEY)
        .unwrap_or_else(|_| "tessera-dev-secret".to_string());
    keys.insert(settings.keys.active.clone(), active_secret.into_bytes());
    keys
}

impl Engine {
    pub async fn try_new(
        settings: &Settings,
        identity: Arc<dyn IdentityVerifier>,
    ) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let codec: Arc<dyn TokenCodec> = Arc::new(JwtCodec::new(
            CodecConfig {
                issuer: settings.token.issuer.clone(),
                audience: settings.token.audience.clone(),
                leeway_secs: settings.token.leeway_secs,
                active_key_id: settings.keys.active.clone(),
                keys: signing_keys(settings),
            },
            clock.clone(),
        ));

        let (families, blacklist): (Arc<dyn FamilyStore>, Arc<dyn RevocationList>) =
            match settings.store.backend.as_str() {
                "memory" => (
                    Arc::new(MemoryFamilyStore::new()),
                    Arc::new(MemoryRevocationList::new(clock.clone())),
                ),
                "redis" => {
                    let url = settings
                        .store
                        .redis_url
                        .as_deref()
                        .ok_or_else(|| anyhow::anyhow!("redis backend needs store.redis_url"))?;
                    let client = redis::Client::open(url)?;
                    let manager = client.get_connection_manager().await?;
                    (
                        Arc::new(RedisFamilyStore::new(manager.clone(), KEY_PREFIX)),
                        Arc::new(RedisRevocationList::new(manager, KEY_PREFIX)),
                    )
                }
                "mysql" => {
                    let url = settings
                        .store
                        .mysql_url
                        .as_deref()
                        .ok_or_else(|| anyhow::anyhow!("mysql backend needs store.mysql_url"))?;
                    let pool = MySqlPool::connect(url).await?;
                    let families: Arc<dyn FamilyStore> = Arc::new(MySqlFamilyStore::new(pool));
                    // the blacklist wants native TTLs, so it rides on
                    // Redis when one is configured alongside MySQL
                    let blacklist: Arc<dyn RevocationList> =
                        match settings.store.redis_url.as_deref() {
                            Some(redis_url) => {
                                let client = redis::Client::open(redis_url)?;
                                let manager = client.get_connection_manager().await?;
                                Arc::new(RedisRevocationList::new(manager, KEY_PREFIX))
                            }
                            None => Arc::new(MemoryRevocationList::new(clock.clone())),
                        };
                    (families, blacklist)
                }
                other => return Err(anyhow::anyhow!("Unknown store backend: {}", other)),
            };

        let policy = TokenPolicy {
            access_ttl: Duration::from_secs(settings.token.access_ttl_secs),
            refresh_ttl: Duration::from_secs(settings.token.refresh_ttl_secs),
        };

        let grant_service: Arc<dyn GrantService> = Arc::new(TokenGrantService::new(
            identity,
            codec,
            families.clone(),
            blacklist.clone(),
            clock.clone(),
            policy,
            settings.blacklist.enabled,
        ));

        let cancel = CancellationToken::new();
        let gc_handle = Self::spawn_sweeper(
            Duration::from_secs(settings.gc.interval_secs),
            families,
            blacklist,
            clock,
            cancel.clone(),
        );

        Ok(Engine {
            grant_service,
            gc_handle: Mutex::new(Some(gc_handle)),
            cancel,
        })
    }

    /// Expired families and blacklist entries are already unusable; the
    /// sweeper only reclaims their storage, so it needs no coordination.
    fn spawn_sweeper(
        interval: Duration,
        families: Arc<dyn FamilyStore>,
        blacklist: Arc<dyn RevocationList>,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let now = clock.now();
                        match families.cleanup_expired(now).await {
                            Ok(removed) if removed > 0 => {
                                info!(removed, "swept expired refresh families");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "family sweep failed"),
                        }
                        match blacklist.cleanup_expired(now).await {
                            Ok(removed) if removed > 0 => {
                                info!(removed, "swept lapsed blacklist entries");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "blacklist sweep failed"),
                        }
                    }
                }
            }
        })
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.gc_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "gc task did not shut down cleanly");
            }
        }
    }
}
