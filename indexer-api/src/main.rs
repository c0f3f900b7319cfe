use alloy_primitives::{utils::format_ether, Address, U256};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use glottis_indexer_core::{
    config::IndexerConfig,
    curve::{
        available_in_current_step, current_step, format_price, max_price, min_price, price_at_progress,
        sample_curve, step_start_supply, token_status, total_eth_for_supply,
    },
    error::IndexerError,
    fixed_point::MathError,
    indexer::Indexer,
    models::{FeeKind, FeeSchedule, TokenRecord, TradeRecord},
    store::AnyStore,
    transport::JsonRpcTransport,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    indexer: Arc<Indexer<JsonRpcTransport, AnyStore>>,
}

fn indexer_status(err: IndexerError) -> StatusCode {
    tracing::error!("indexer request failed: {err:?}");
    match err {
        IndexerError::Transport(_) => StatusCode::BAD_GATEWAY,
        IndexerError::Decode(_) | IndexerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn math_status(err: MathError) -> StatusCode {
    tracing::debug!("rejecting step query: {err}");
    StatusCode::BAD_REQUEST
}

fn parse_address(raw: &str) -> Result<Address, StatusCode> {
    raw.parse().map_err(|_| StatusCode::BAD_REQUEST)
}

fn parse_amount(raw: &str) -> Result<U256, StatusCode> {
    raw.parse().map_err(|_| StatusCode::BAD_REQUEST)
}

async fn find_token(state: &AppState, address: Address) -> Result<TokenRecord, StatusCode> {
    let cached = state
        .indexer
        .cached_tokens()
        .await
        .map_err(|e| indexer_status(e.into()))?;
    if let Some(token) = cached.records.into_iter().find(|t| t.address == address) {
        return Ok(token);
    }

    // not cached yet, catch up once before giving up
    let tokens = state.indexer.list_tokens().await.map_err(indexer_status)?;
    tokens
        .into_iter()
        .find(|t| t.address == address)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics_handler(State(state): State<AppState>) -> Result<Json<JsonValue>, StatusCode> {
    let tokens = state
        .indexer
        .cached_tokens()
        .await
        .map_err(|e| indexer_status(e.into()))?;

    let metrics = json!({
        "contract_address": state.indexer.contract(),
        "tokens_count": tokens.records.len(),
        "last_processed_block": tokens.last_processed_block(),
    });

    Ok(Json(metrics))
}

async fn tokens_handler(State(state): State<AppState>) -> Result<Json<Vec<TokenRecord>>, StatusCode> {
    let tokens = state.indexer.list_tokens().await.map_err(indexer_status)?;
    Ok(Json(tokens))
}

#[derive(Debug, Deserialize)]
struct TradesQuery {
    limit: Option<usize>,
}

async fn trades_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(q): Query<TradesQuery>,
) -> Result<Json<Vec<TradeRecord>>, StatusCode> {
    let token = find_token(&state, parse_address(&address)?).await?;
    let limit = q.limit.unwrap_or(200).clamp(1, 5_000);

    let mut trades = state
        .indexer
        .list_trades(token.address)
        .await
        .map_err(indexer_status)?;
    trades.truncate(limit);

    Ok(Json(trades))
}

#[derive(Debug, Deserialize)]
struct PriceQuery {
    /// Fraction of the sale supply sold, scaled by 1e18.
    progress: Option<String>,
}

async fn price_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(q): Query<PriceQuery>,
) -> Result<Json<JsonValue>, StatusCode> {
    let token = find_token(&state, parse_address(&address)?).await?;
    let progress = match q.progress.as_deref() {
        Some(raw) => parse_amount(raw)?,
        None => U256::ZERO,
    };

    let price = price_at_progress(Some(&token.price_points), progress);
    let status = token_status(Some(progress));

    Ok(Json(json!({
        "token": token.address,
        "progress": progress.to_string(),
        "price_wei": price.to_string(),
        "price": format_price(price),
        "status": status,
        "status_label": status.label(),
        "progress_label": status.progress_label(),
    })))
}

#[derive(Debug, Deserialize)]
struct CurveQuery {
    steps: Option<u32>,
}

async fn curve_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(q): Query<CurveQuery>,
) -> Result<Json<JsonValue>, StatusCode> {
    let token = find_token(&state, parse_address(&address)?).await?;
    let steps = q.steps.unwrap_or(1_000).clamp(1, 10_000);
    let points = &token.price_points;

    Ok(Json(json!({
        "token": token.address,
        "samples": sample_curve(points, steps),
        "min_price_wei": min_price(points),
        "max_price_wei": max_price(points),
        "total_eth": total_eth_for_supply(points, token.max_supply),
    })))
}

fn fees_body(fees: &FeeSchedule) -> JsonValue {
    let mut body = serde_json::Map::new();
    for fee in FeeKind::ALL {
        let wei = fees.get(fee);
        body.insert(
            fee.name().to_ascii_lowercase(),
            json!({ "wei": wei.to_string(), "eth": format_ether(wei) }),
        );
    }
    JsonValue::Object(body)
}

async fn fees_handler(State(state): State<AppState>) -> Json<JsonValue> {
    let fees = state.indexer.fee_schedule().await;
    Json(fees_body(&fees))
}

#[derive(Debug, Deserialize)]
struct StepsQuery {
    total_supply: String,
    max_supply: String,
}

async fn steps_handler(Query(q): Query<StepsQuery>) -> Result<Json<JsonValue>, StatusCode> {
    let total_supply = parse_amount(&q.total_supply)?;
    let max_supply = parse_amount(&q.max_supply)?;

    let step = current_step(total_supply, max_supply).map_err(math_status)?;
    let start = step_start_supply(total_supply, max_supply).map_err(math_status)?;
    let available = available_in_current_step(total_supply, max_supply).map_err(math_status)?;

    Ok(Json(json!({
        "current_step": step,
        "step_start_supply": start.to_string(),
        "available_in_current_step": available.to_string(),
    })))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = IndexerConfig::from_env()?;

    let transport = JsonRpcTransport::new(&config.rpc)?;
    let store = AnyStore::from_config(&config.store).await?;
    let state = AppState {
        indexer: Arc::new(Indexer::from_config(transport, store, &config)),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/tokens", get(tokens_handler))
        .route("/tokens/:address/trades", get(trades_handler))
        .route("/tokens/:address/price", get(price_handler))
        .route("/tokens/:address/curve", get(curve_handler))
        .route("/fees", get(fees_handler))
        .route("/steps", get(steps_handler))
        .with_state(state);

    let addr: SocketAddr = config.api.bind_addr.parse()?;
    tracing::info!("Starting API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glottis_indexer_core::{decoder::DecodeError, store::StoreError, transport::TransportError};

    fn steps(total_supply: &str, max_supply: &str) -> Query<StepsQuery> {
        Query(StepsQuery {
            total_supply: total_supply.to_string(),
            max_supply: max_supply.to_string(),
        })
    }

    #[tokio::test]
    async fn test_steps_handler_reports_step_position() {
        let Json(body) = steps_handler(steps("12345", "1000000")).await.unwrap();
        assert_eq!(body["current_step"], json!(1));
        assert_eq!(body["step_start_supply"], json!("10000"));
        assert_eq!(body["available_in_current_step"], json!("2655"));
    }

    #[tokio::test]
    async fn test_steps_handler_rejects_zero_max_supply() {
        let result = steps_handler(steps("100", "0")).await;
        assert_eq!(result.err(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_steps_handler_rejects_non_numeric_input() {
        let result = steps_handler(steps("lots", "1000000")).await;
        assert_eq!(result.err(), Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_indexer_failures_map_to_server_side_statuses() {
        assert_eq!(
            indexer_status(TransportError::BlockNotFound(1).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            indexer_status(StoreError::Poisoned.into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            indexer_status(DecodeError::UnrecognizedEvent(None).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_fees_body_lists_every_fee() {
        let body = fees_body(&FeeSchedule::default());
        assert_eq!(body.as_object().unwrap().len(), 4);
        assert_eq!(body["protocol_fee"]["wei"], json!("1500000000000000"));
        assert_eq!(body["burn_fee"]["wei"], json!("3500000000000000"));
        assert!(body["creator_fee"]["eth"].as_str().unwrap().starts_with("0.001"));
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("0x543916e128A59abBc191Aa1dB2889A58f4732489").is_ok());
        assert_eq!(parse_address("0x1234"), Err(StatusCode::BAD_REQUEST));
    }
}
