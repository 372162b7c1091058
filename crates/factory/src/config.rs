//! Backend selection configuration
//!
//! Deserializable so the configuration layer can hand its parsed settings
//! straight to [`crate::build`].

use std::path::PathBuf;

use serde::Deserialize;

use logvault_storage_redis::RedisStoreOptions;

/// Which backend family to construct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Volatile in-memory backend.
    Memory,
    /// Embedded JSON-lines file backend.
    #[serde(alias = "nedb-style-file")]
    File,
    /// Remote key-value backend.
    #[serde(alias = "remote-kv")]
    Redis,
}

/// Connection settings for the Redis backend.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RedisConfig {
    /// Full connection URL; wins over the discrete fields when set.
    #[serde(default)]
    pub url: Option<String>,
    /// Server host.
    #[serde(default)]
    pub host: Option<String>,
    /// Server port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Optional AUTH password.
    #[serde(default)]
    pub password: Option<String>,
    /// Logical database index.
    #[serde(default)]
    pub db: Option<i64>,
    /// Connect with TLS.
    #[serde(default)]
    pub tls: bool,
    /// Extra outermost key prefix.
    #[serde(default, alias = "keyPrefix")]
    pub key_prefix: Option<String>,
}

impl RedisConfig {
    pub(crate) fn to_options(&self) -> RedisStoreOptions {
        let defaults = RedisStoreOptions::default();
        RedisStoreOptions {
            url: self.url.clone(),
            host: self.host.clone().unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
            password: self.password.clone(),
            db: self.db.unwrap_or(defaults.db),
            tls: self.tls,
            key_prefix: self.key_prefix.clone(),
        }
    }
}

/// Full backend selection configuration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StoreConfig {
    /// Requested backend family; absent means in-memory.
    #[serde(default, rename = "type")]
    pub backend: Option<BackendKind>,
    /// Directory for the file backend's collections.
    #[serde(default, alias = "dbPath")]
    pub db_path: Option<PathBuf>,
    /// Force the in-memory backend regardless of `type`.
    #[serde(default, alias = "inMemoryOnly")]
    pub in_memory_only: bool,
    /// Redis connection settings; presence selects the Redis backend.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}
