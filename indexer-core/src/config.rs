 use crate::cursor::{CHUNK_SIZE, DEPLOYMENT_BLOCK};
 use alloy_primitives::Address;
 use anyhow::Result;
 use serde::Deserialize;

 #[derive(Debug, Deserialize, Clone)]
 pub struct RuntimeConfig {
     pub environment: String,
 }

 #[derive(Debug, Deserialize, Clone)]
 pub struct ApiConfig {
     pub bind_addr: String,
 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

 #[derive(Debug, Deserialize, Clone)]
 pub struct RpcConfig {
     pub url: String,
     /// Launch contract emitting `TokenCreated`, `TokensPurchased` and `TokensSold`.
     pub contract_address: Address,
     #[serde(default)]
     pub timeout_ms: Option<u64>,
 }

 #[derive(Debug, Deserialize, Clone)]
 pub struct IndexingConfig {
     #[serde(default = "default_chunk_size")]
     pub chunk_size: u64,
     #[serde(default = "default_deployment_block")]
     pub deployment_block: u64,
     #[serde(default)]
     pub poll_interval_ms: Option<u64>,
     #[serde(default)]
     pub initial_backoff_ms: Option<u64>,
     #[serde(default)]
     pub max_backoff_ms: Option<u64>,
 }

fn default_chunk_size() -> u64 {
    CHUNK_SIZE
}

fn default_deployment_block() -> u64 {
    DEPLOYMENT_BLOCK
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            deployment_block: DEPLOYMENT_BLOCK,
            poll_interval_ms: None,
            initial_backoff_ms: None,
            max_backoff_ms: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
    Postgres,
}

 #[derive(Debug, Deserialize, Clone)]
 pub struct DbConfig {
     pub url: String,
     pub max_connections: u32,
 }

 #[derive(Debug, Deserialize, Clone)]
 pub struct RedisConfig {
     pub host: String,
     pub port: u16,
     pub db: u8,
     #[serde(default)]
     pub password: String,
     #[serde(default)]
     pub key_prefix: String,
 }

 #[derive(Debug, Deserialize, Clone)]
 pub struct StoreConfig {
     pub backend: StoreBackend,
     #[serde(default)]
     pub redis: Option<RedisConfig>,
     #[serde(default)]
     pub db: Option<DbConfig>,
 }

 #[derive(Debug, Deserialize, Clone)]
 pub struct IndexerConfig {
     pub runtime: RuntimeConfig,
     #[serde(default)]
     pub api: ApiConfig,
     pub rpc: RpcConfig,
     #[serde(default)]
     pub indexer: IndexingConfig,
     pub store: StoreConfig,
 }

 impl IndexerConfig {
     pub fn from_env() -> Result<Self> {
        // Load base config from `config/default.(toml|yaml|json)` relative to the
        // current working directory (the workspace root), then override with
        // `INDEXER__...` environment variables.
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("INDEXER").separator("__"))
            .build()?;

        settings.try_deserialize().map_err(Into::into)
     }
 }
