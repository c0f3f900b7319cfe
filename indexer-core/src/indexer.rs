// Chunked catch-up over the launch contract's logs.
//
// Each stream (token creations, and one trade stream per token) walks from its
// persisted cursor to the chain head one chunk at a time. A chunk is fetched,
// fully decoded and merged before the next one is requested, so the persisted
// cursor never passes a block whose logs are not stored.

use crate::{
    cache::{sort_trades_for_display, CacheSnapshot, IndexerCache},
    config::IndexerConfig,
    cursor::{next_chunk, StreamKey},
    decoder::{decode_token_created, decode_trade, TOKENS_PURCHASED_TOPIC, TOKENS_SOLD_TOPIC, TOKEN_CREATED_TOPIC},
    error::IndexerError,
    models::{FeeKind, FeeSchedule, TokenRecord, TradeRecord},
    store::{KvStore, StoreError},
    transport::{LogFilter, RawLog, TopicFilter, Transport, TransportError},
};
use alloy_primitives::{Address, U256};
use futures::future::try_join_all;
use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, info, warn};

pub struct Indexer<T, S> {
    transport: T,
    cache: IndexerCache<S>,
    contract: Address,
    chunk_size: u64,
    stream_locks: Mutex<HashMap<StreamKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl<T: Transport, S: KvStore> Indexer<T, S> {
    pub fn new(transport: T, store: S, contract: Address, deployment_block: u64, chunk_size: u64) -> Self {
        Self {
            transport,
            cache: IndexerCache::new(store, deployment_block),
            contract,
            // a one-block chunk would end on the cursor block and never advance it
            chunk_size: chunk_size.max(2),
            stream_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(transport: T, store: S, config: &IndexerConfig) -> Self {
        Self::new(
            transport,
            store,
            config.rpc.contract_address,
            config.indexer.deployment_block,
            config.indexer.chunk_size,
        )
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cache(&self) -> &IndexerCache<S> {
        &self.cache
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Catches up on the token stream and returns every discovered token in discovery order.
    pub async fn list_tokens(&self) -> Result<Vec<TokenRecord>, IndexerError> {
        Ok(self.sync_tokens().await?.records)
    }

    /// Catches up on `token`'s trades and returns them newest block first.
    pub async fn list_trades(&self, token: Address) -> Result<Vec<TradeRecord>, IndexerError> {
        let mut trades = self.sync_trades(token).await?.records;
        sort_trades_for_display(&mut trades);
        Ok(trades)
    }

    /// Tokens already persisted, without touching the chain.
    pub async fn cached_tokens(&self) -> Result<CacheSnapshot<TokenRecord>, StoreError> {
        self.cache.load(StreamKey::Tokens).await
    }

    /// Trades already persisted for `token`, in storage order.
    pub async fn cached_trades(&self, token: Address) -> Result<CacheSnapshot<TradeRecord>, StoreError> {
        self.cache.load(StreamKey::Trades(token)).await
    }

    pub async fn sync_tokens(&self) -> Result<CacheSnapshot<TokenRecord>, IndexerError> {
        let key = StreamKey::Tokens;
        let lock = self.stream_lock(key);
        let _guard = lock.lock().await;

        let mut snapshot: CacheSnapshot<TokenRecord> = self.cache.load(key).await?;
        let height = self.transport.block_number().await?;

        while let Some(range) = next_chunk(&snapshot.cursor, height, self.chunk_size) {
            let filter = LogFilter {
                address: self.contract,
                topics: vec![TopicFilter::Exact(TOKEN_CREATED_TOPIC)],
                range,
            };
            let logs = self.transport.get_logs(&filter).await?;
            debug!("{key}: {} logs in {}..={}", logs.len(), range.from, range.to);

            let tokens = logs
                .iter()
                .map(decode_token_created)
                .collect::<Result<Vec<_>, _>>()?;

            let appended = self.cache.merge(&mut snapshot, tokens, range.to).await?;
            info!(
                "{key}: blocks {}..={} -> {appended} new tokens ({} total)",
                range.from,
                range.to,
                snapshot.records.len()
            );
        }

        Ok(snapshot)
    }

    pub async fn sync_trades(&self, token: Address) -> Result<CacheSnapshot<TradeRecord>, IndexerError> {
        let key = StreamKey::Trades(token);
        let lock = self.stream_lock(key);
        let _guard = lock.lock().await;

        let mut snapshot: CacheSnapshot<TradeRecord> = self.cache.load(key).await?;
        let height = self.transport.block_number().await?;

        if next_chunk(&snapshot.cursor, height, self.chunk_size).is_none() {
            return Ok(snapshot);
        }

        let creator = self.creator_of(token).await;

        while let Some(range) = next_chunk(&snapshot.cursor, height, self.chunk_size) {
            let filter = LogFilter {
                address: self.contract,
                topics: vec![
                    TopicFilter::OneOf(vec![TOKENS_PURCHASED_TOPIC, TOKENS_SOLD_TOPIC]),
                    TopicFilter::Exact(token.into_word()),
                ],
                range,
            };
            let logs = self.transport.get_logs(&filter).await?;
            debug!("{key}: {} logs in {}..={}", logs.len(), range.from, range.to);

            let timestamps = self.block_timestamps(&logs).await?;
            let trades = logs
                .iter()
                .map(|log| {
                    let timestamp = timestamps.get(&log.block_number).copied().unwrap_or_default();
                    decode_trade(log, timestamp, creator)
                })
                .collect::<Result<Vec<_>, _>>()?;

            let appended = self.cache.merge(&mut snapshot, trades, range.to).await?;
            info!(
                "{key}: blocks {}..={} -> {appended} new trades ({} total)",
                range.from,
                range.to,
                snapshot.records.len()
            );
        }

        Ok(snapshot)
    }

    /// The contract's fee constants. A fee that cannot be read falls back to its launch value.
    pub async fn fee_schedule(&self) -> FeeSchedule {
        let (protocol, creator, caller, burn) = futures::join!(
            self.fee_or_default(FeeKind::Protocol),
            self.fee_or_default(FeeKind::Creator),
            self.fee_or_default(FeeKind::Caller),
            self.fee_or_default(FeeKind::Burn),
        );
        FeeSchedule {
            protocol,
            creator,
            caller,
            burn,
        }
    }

    async fn fee_or_default(&self, fee: FeeKind) -> U256 {
        match self.transport.read_fee(fee).await {
            Ok(wei) => wei,
            Err(e) => {
                let fallback = fee.default_wei();
                warn!("reading {} failed, using {fallback} wei: {e}", fee.name());
                fallback
            }
        }
    }

    /// Creator of `token`, or the zero address when the lookup fails.
    async fn creator_of(&self, token: Address) -> Address {
        match self.transport.read_token_creator(token).await {
            Ok(creator) => creator,
            Err(e) => {
                warn!("creator lookup for {token} failed, treating all trades as non-creator: {e}");
                Address::ZERO
            }
        }
    }

    /// Fetches each distinct block's timestamp concurrently.
    async fn block_timestamps(&self, logs: &[RawLog]) -> Result<HashMap<u64, u64>, TransportError> {
        let blocks: BTreeSet<u64> = logs.iter().map(|log| log.block_number).collect();
        let fetches = blocks.into_iter().map(|block| async move {
            let timestamp = self.transport.block_timestamp(block).await?;
            Ok::<_, TransportError>((block, timestamp))
        });
        Ok(try_join_all(fetches).await?.into_iter().collect())
    }

    fn stream_lock(&self, key: StreamKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.stream_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key).or_default().clone()
    }
}
