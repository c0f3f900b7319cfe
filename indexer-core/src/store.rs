// Key/value persistence for the indexer cache.
//
// Values are opaque strings (JSON arrays and decimal cursors). `set_many` must
// apply all of its entries or none of them: the cache writes a chunk's records
// and its cursor in one call.

use crate::config::{DbConfig, RedisConfig, StoreBackend, StoreConfig};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::{collections::HashMap, sync::Mutex};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),
    #[error("stored value under {key} is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored cursor under {key} is not a block number: {value}")]
    BadCursor { key: String, value: String },
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes every entry atomically.
    async fn set_many(&self, entries: &[(String, String)]) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn set_many(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        let mut stored = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        for (key, value) in entries {
            stored.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

pub struct RedisStore {
    client: ConnectionManager,
    key_prefix: String,
}

fn redis_connection_string(config: &RedisConfig) -> String {
    if config.password.is_empty() {
        format!("redis://{}:{}/{}", config.host, config.port, config.db)
    } else {
        format!(
            "redis://:{}@{}:{}/{}",
            config.password, config.host, config.port, config.db
        )
    }
}

impl RedisStore {
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(redis_connection_string(config))?;
        let client_manager = ConnectionManager::new(client).await?;

        info!("Connected to Redis at {}:{}", config.host, config.port);

        Ok(RedisStore {
            client: client_manager,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value: Option<String> = redis::cmd("GET")
            .arg(self.prefixed(key))
            .query_async(&mut self.client.clone())
            .await?;
        Ok(value)
    }

    async fn set_many(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        // MULTI/EXEC so a chunk's records and cursor land together
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.cmd("SET").arg(self.prefixed(key)).arg(value).ignore();
        }

        let _: () = pipe.query_async(&mut self.client.clone()).await?;
        Ok(())
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn new(config: &DbConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        // Embed migrations from the workspace `migrations` directory.
        sqlx::migrate!("../migrations").run(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl KvStore for PgStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT value FROM kv_store
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    async fn set_many(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for (key, value) in entries {
            sqlx::query(
                r#"
                INSERT INTO kv_store (key, value, updated_at)
                VALUES ($1, $2, now())
                ON CONFLICT (key) DO UPDATE
                SET value = EXCLUDED.value,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Store selected at runtime from configuration.
pub enum AnyStore {
    Memory(MemoryStore),
    Redis(RedisStore),
    Postgres(PgStore),
}

impl AnyStore {
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        match config.backend {
            StoreBackend::Memory => Ok(AnyStore::Memory(MemoryStore::new())),
            StoreBackend::Redis => {
                let redis = config
                    .redis
                    .as_ref()
                    .ok_or_else(|| anyhow!("store.backend = redis but [store.redis] is missing"))?;
                Ok(AnyStore::Redis(RedisStore::new(redis).await?))
            }
            StoreBackend::Postgres => {
                let db = config
                    .db
                    .as_ref()
                    .ok_or_else(|| anyhow!("store.backend = postgres but [store.db] is missing"))?;
                Ok(AnyStore::Postgres(PgStore::new(db).await?))
            }
        }
    }
}

#[async_trait]
impl KvStore for AnyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            AnyStore::Memory(s) => s.get(key).await,
            AnyStore::Redis(s) => s.get(key).await,
            AnyStore::Postgres(s) => s.get(key).await,
        }
    }

    async fn set_many(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        match self {
            AnyStore::Memory(s) => s.set_many(entries).await,
            AnyStore::Redis(s) => s.set_many(entries).await,
            AnyStore::Postgres(s) => s.set_many(entries).await,
        }
    }
}
