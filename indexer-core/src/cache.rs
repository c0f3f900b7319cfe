// Durable per-stream cache: an append-only record list plus the stream cursor.
//
// Records are stored as one JSON array under the stream's records key and the
// cursor as a decimal string under its cursor key. A merge rewrites both in a
// single atomic `set_many`, so a crash leaves either the old or the new pair.

use crate::{
    cursor::{StreamCursor, StreamKey},
    models::{TokenRecord, TradeRecord},
    store::{KvStore, StoreError},
};
use alloy_primitives::{Address, B256};
use serde::{de::DeserializeOwned, Serialize};
use std::{collections::HashSet, hash::Hash};
use tracing::debug;

/// A cached record with a stable identity, used to skip re-fetched logs on merge.
pub trait CacheRecord: Serialize + DeserializeOwned + Clone + Send + Sync {
    type Id: Eq + Hash;

    fn record_id(&self) -> Self::Id;

    fn block_number(&self) -> u64;
}

impl CacheRecord for TokenRecord {
    type Id = Address;

    fn record_id(&self) -> Address {
        self.address
    }

    fn block_number(&self) -> u64 {
        self.created_at_block
    }
}

impl CacheRecord for TradeRecord {
    /// Position of the emitting log. Identical fills in one block stay distinct.
    type Id = (B256, u64);

    fn record_id(&self) -> (B256, u64) {
        (self.transaction_hash, self.log_index)
    }

    fn block_number(&self) -> u64 {
        self.block_number
    }
}

/// Records of one stream in insertion order, with the stream cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot<R> {
    pub cursor: StreamCursor,
    pub records: Vec<R>,
}

impl<R> CacheSnapshot<R> {
    pub fn last_processed_block(&self) -> u64 {
        self.cursor.last_processed_block
    }
}

pub struct IndexerCache<S> {
    store: S,
    deployment_block: u64,
}

impl<S: KvStore> IndexerCache<S> {
    pub fn new(store: S, deployment_block: u64) -> Self {
        Self {
            store,
            deployment_block,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads a stream's snapshot. A stream never written starts empty at the deployment block.
    pub async fn load<R: CacheRecord>(&self, key: StreamKey) -> Result<CacheSnapshot<R>, StoreError> {
        let cursor_key = key.cursor_key();
        let last_processed_block = match self.store.get(&cursor_key).await? {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|_| StoreError::BadCursor {
                    key: cursor_key.clone(),
                    value,
                })?,
            None => self.deployment_block,
        };

        let records_key = key.records_key();
        let records = match self.store.get(&records_key).await? {
            Some(json) => serde_json::from_str(&json).map_err(|source| StoreError::Corrupt {
                key: records_key,
                source,
            })?,
            None => Vec::new(),
        };

        Ok(CacheSnapshot {
            cursor: StreamCursor::new(key, last_processed_block),
            records,
        })
    }

    /// Appends `new_records` not already present and moves the cursor to `new_cursor_block`.
    ///
    /// Both are persisted in one atomic write. `snapshot` is only updated once
    /// that write succeeds, so a failed merge leaves it as it was. The cursor
    /// never moves back. Returns the number of records appended.
    pub async fn merge<R: CacheRecord>(
        &self,
        snapshot: &mut CacheSnapshot<R>,
        new_records: Vec<R>,
        new_cursor_block: u64,
    ) -> Result<usize, StoreError> {
        let mut seen: HashSet<R::Id> = snapshot.records.iter().map(CacheRecord::record_id).collect();
        let fresh: Vec<R> = new_records
            .into_iter()
            .filter(|r| seen.insert(r.record_id()))
            .collect();

        let mut cursor = snapshot.cursor;
        cursor.advance(new_cursor_block);

        let mut records = Vec::with_capacity(snapshot.records.len() + fresh.len());
        records.extend(snapshot.records.iter().cloned());
        records.extend(fresh.iter().cloned());

        let key = cursor.key;
        self.store
            .set_many(&[
                (key.records_key(), serde_json::to_string(&records)?),
                (key.cursor_key(), cursor.last_processed_block.to_string()),
            ])
            .await?;

        debug!(
            "merged {} new records into {key}, cursor {} -> {}",
            fresh.len(),
            snapshot.cursor.last_processed_block,
            cursor.last_processed_block
        );

        let appended = fresh.len();
        snapshot.records = records;
        snapshot.cursor = cursor;
        Ok(appended)
    }
}

/// Presentation order for trades: newest block first, ties kept in insertion order.
pub fn sort_trades_for_display(trades: &mut [TradeRecord]) {
    trades.sort_by(|a, b| b.block_number.cmp(&a.block_number));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cursor::DEPLOYMENT_BLOCK,
        models::{PricePoints, TradeKind},
        store::MemoryStore,
    };
    use alloy_primitives::U256;
    use async_trait::async_trait;

    fn token(byte: u8, block: u64) -> TokenRecord {
        TokenRecord {
            address: Address::repeat_byte(byte),
            name: format!("token-{byte}"),
            symbol: format!("T{byte}"),
            max_supply: U256::from(1_000_000u64),
            price_points: PricePoints([100, 200, 150, 300]),
            created_at_block: block,
        }
    }

    fn trade(block: u64, log_index: u64) -> TradeRecord {
        TradeRecord {
            token_address: Address::repeat_byte(0xaa),
            kind: TradeKind::Purchase,
            trader: Address::repeat_byte(0x01),
            amount: U256::from(block),
            eth_spent: U256::from(1u64),
            block_number: block,
            timestamp: 1_700_000_000 + block,
            is_creator_trade: false,
            transaction_hash: B256::repeat_byte(log_index as u8),
            log_index,
        }
    }

    struct FailingStore;

    #[async_trait]
    impl KvStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        async fn set_many(&self, _entries: &[(String, String)]) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[tokio::test]
    async fn test_load_empty_stream_starts_at_deployment_block() {
        let cache = IndexerCache::new(MemoryStore::new(), DEPLOYMENT_BLOCK);
        let snapshot: CacheSnapshot<TokenRecord> = cache.load(StreamKey::Tokens).await.unwrap();
        assert_eq!(snapshot.last_processed_block(), DEPLOYMENT_BLOCK);
        assert!(snapshot.records.is_empty());
    }

    #[tokio::test]
    async fn test_merge_persists_records_and_cursor() {
        let cache = IndexerCache::new(MemoryStore::new(), 100);
        let mut snapshot = cache.load(StreamKey::Tokens).await.unwrap();

        let appended = cache
            .merge(&mut snapshot, vec![token(1, 150), token(2, 160)], 199)
            .await
            .unwrap();
        assert_eq!(appended, 2);
        assert_eq!(snapshot.last_processed_block(), 199);

        let reloaded: CacheSnapshot<TokenRecord> = cache.load(StreamKey::Tokens).await.unwrap();
        assert_eq!(reloaded, snapshot);
        assert_eq!(
            cache.store().get("lastProcessedBlock").await.unwrap().as_deref(),
            Some("199")
        );
    }

    #[tokio::test]
    async fn test_merge_skips_already_stored_records() {
        let cache = IndexerCache::new(MemoryStore::new(), 100);
        let mut snapshot = cache.load(StreamKey::Tokens).await.unwrap();
        cache.merge(&mut snapshot, vec![token(1, 150)], 199).await.unwrap();

        // the next chunk starts at the cursor block and sees token 1 again
        let appended = cache
            .merge(&mut snapshot, vec![token(1, 150), token(3, 250)], 299)
            .await
            .unwrap();
        assert_eq!(appended, 1);
        let addresses: Vec<Address> = snapshot.records.iter().map(|t| t.address).collect();
        assert_eq!(addresses, vec![Address::repeat_byte(1), Address::repeat_byte(3)]);
    }

    #[tokio::test]
    async fn test_merge_cursor_is_monotonic() {
        let cache = IndexerCache::new(MemoryStore::new(), 100);
        let mut snapshot: CacheSnapshot<TokenRecord> = cache.load(StreamKey::Tokens).await.unwrap();

        let mut previous = snapshot.last_processed_block();
        for target in [500u64, 300, 900, 900, 50, 1_200] {
            cache.merge(&mut snapshot, Vec::new(), target).await.unwrap();
            assert!(snapshot.last_processed_block() >= previous);
            previous = snapshot.last_processed_block();
        }
        assert_eq!(previous, 1_200);
    }

    #[tokio::test]
    async fn test_failed_merge_leaves_snapshot_untouched() {
        let cache = IndexerCache::new(FailingStore, 100);
        let mut snapshot = cache.load(StreamKey::Tokens).await.unwrap();
        let before = snapshot.clone();

        let result = cache.merge(&mut snapshot, vec![token(1, 150)], 199).await;
        assert!(result.is_err());
        assert_eq!(snapshot, before);
    }

    #[tokio::test]
    async fn test_trade_stream_keeps_insertion_order_in_storage() {
        let token_address = Address::repeat_byte(0xaa);
        let cache = IndexerCache::new(MemoryStore::new(), 100);
        let mut snapshot = cache.load(StreamKey::Trades(token_address)).await.unwrap();

        cache
            .merge(&mut snapshot, vec![trade(110, 0), trade(120, 1)], 150)
            .await
            .unwrap();

        let stored: CacheSnapshot<TradeRecord> =
            cache.load(StreamKey::Trades(token_address)).await.unwrap();
        let blocks: Vec<u64> = stored.records.iter().map(|t| t.block_number).collect();
        assert_eq!(blocks, vec![110, 120]);

        let mut display = stored.records.clone();
        sort_trades_for_display(&mut display);
        let blocks: Vec<u64> = display.iter().map(|t| t.block_number).collect();
        assert_eq!(blocks, vec![120, 110]);
    }

    #[tokio::test]
    async fn test_identical_fills_in_one_transaction_are_both_kept() {
        let token_address = Address::repeat_byte(0xaa);
        let cache = IndexerCache::new(MemoryStore::new(), 100);
        let mut snapshot = cache.load(StreamKey::Trades(token_address)).await.unwrap();

        // same trader, amount and block; only the log index differs
        let first = trade(110, 0);
        let mut second = first.clone();
        second.log_index = 1;
        assert_ne!(first.record_id(), second.record_id());

        let appended = cache
            .merge(&mut snapshot, vec![first.clone(), second.clone()], 150)
            .await
            .unwrap();
        assert_eq!(appended, 2);

        // re-reading the same logs adds nothing
        let appended = cache.merge(&mut snapshot, vec![first, second], 150).await.unwrap();
        assert_eq!(appended, 0);
        assert_eq!(snapshot.records.len(), 2);
    }

    #[test]
    fn test_display_sort_is_stable_and_idempotent() {
        let mut trades = vec![trade(5, 1), trade(9, 2), trade(5, 3)];
        sort_trades_for_display(&mut trades);
        let order: Vec<u64> = trades.iter().map(|t| t.log_index).collect();
        assert_eq!(order, vec![2, 1, 3]);

        let once = trades.clone();
        sort_trades_for_display(&mut trades);
        assert_eq!(trades, once);
    }

    #[tokio::test]
    async fn test_corrupt_cursor_is_a_storage_error() {
        let store = MemoryStore::new();
        store
            .set_many(&[("lastProcessedBlock".to_string(), "soon".to_string())])
            .await
            .unwrap();
        let cache = IndexerCache::new(store, 100);
        let result: Result<CacheSnapshot<TokenRecord>, _> = cache.load(StreamKey::Tokens).await;
        assert!(matches!(result, Err(StoreError::BadCursor { .. })));
    }
}
