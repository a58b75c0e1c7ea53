use anyhow::{Result, anyhow};
use config::{Config, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub log: Log,
    pub token: Token,
    pub keys: Keys,
    pub store: Store,
    pub blacklist: Blacklist,
    pub gc: Gc,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct Token {
    pub issuer: String,
    pub audience: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub leeway_secs: u64,
}

/// Signing key ids. Secrets never live in the settings file; they are
/// looked up from the environment by key id at startup.
#[derive(Debug, Deserialize)]
pub struct Keys {
    pub active: String,
    #[serde(default)]
    pub retired: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Store {
    pub backend: String, // "memory", "redis" or "mysql"
    pub redis_url: Option<String>,
    pub mysql_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Blacklist {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct Gc {
    pub interval_secs: u64,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
