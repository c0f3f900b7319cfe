use anyhow::Result;
use glottis_indexer_core::{
    config::IndexerConfig,
    indexer::Indexer,
    store::AnyStore,
    transport::JsonRpcTransport,
};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

type Daemon = Indexer<JsonRpcTransport, AnyStore>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = IndexerConfig::from_env()?;

    tracing::info!("Starting indexer with config: {:?}", config.runtime);
    tracing::info!(
        "Indexing contract {} from block {} via {}",
        config.rpc.contract_address,
        config.indexer.deployment_block,
        config.rpc.url
    );

    let transport = JsonRpcTransport::new(&config.rpc)?;
    let store = AnyStore::from_config(&config.store).await?;
    let indexer = Arc::new(Indexer::from_config(transport, store, &config));

    run_indexer(config, indexer).await
}

async fn run_indexer(config: IndexerConfig, indexer: Arc<Daemon>) -> Result<()> {
    let poll_interval = Duration::from_millis(config.indexer.poll_interval_ms.unwrap_or(12_000));
    let initial_backoff_ms = config.indexer.initial_backoff_ms.unwrap_or(1_000);
    let max_backoff_ms = config.indexer.max_backoff_ms.unwrap_or(60_000);
    let mut backoff_ms = initial_backoff_ms;

    loop {
        match run_cycle(&indexer).await {
            Ok(0) => {
                backoff_ms = initial_backoff_ms;
                tokio::time::sleep(poll_interval).await;
            }
            Ok(failed_streams) => {
                tracing::warn!(
                    "{failed_streams} trade streams failed, retrying in {backoff_ms}ms from their last persisted cursors"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(max_backoff_ms);
            }
            Err(e) => {
                tracing::error!("Token stream cycle failed: {e:?}");
                tracing::warn!("Retrying in {backoff_ms}ms from the last persisted cursor");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(max_backoff_ms);
            }
        }
    }
}

/// Catches up the token stream, then every token's trade stream in parallel.
/// Returns the number of trade streams that failed.
async fn run_cycle(indexer: &Arc<Daemon>) -> Result<usize> {
    let tokens = indexer.sync_tokens().await?;
    tracing::info!(
        "Token stream at block {} with {} tokens",
        tokens.last_processed_block(),
        tokens.records.len()
    );

    let mut trade_syncs = JoinSet::new();
    for token in tokens.records.iter().map(|t| t.address) {
        let indexer = Arc::clone(indexer);
        trade_syncs.spawn(async move { (token, indexer.sync_trades(token).await) });
    }

    let mut failed = 0;
    while let Some(joined) = trade_syncs.join_next().await {
        match joined {
            Ok((token, Ok(trades))) => {
                tracing::debug!(
                    "Trades for {token} at block {} ({} stored)",
                    trades.last_processed_block(),
                    trades.records.len()
                );
            }
            Ok((token, Err(e))) => {
                failed += 1;
                tracing::error!("Trade stream for {token} failed: {e:?}");
            }
            Err(e) => {
                failed += 1;
                tracing::error!("Trade sync task panicked: {e:?}");
            }
        }
    }

    Ok(failed)
}
