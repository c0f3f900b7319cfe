// Ethereum JSON-RPC access: block height, log ranges, block timestamps and
// read-only calls on the launch contract.

use crate::{
    config::RpcConfig,
    cursor::BlockRange,
    decoder::{readTokenCreatorCall, BURN_FEECall, CALLER_FEECall, CREATOR_FEECall, PROTOCOL_FEECall},
    models::FeeKind,
};
use alloy_primitives::{Address, Bytes, B256, U256, U64};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("invalid rpc response: {0}")]
    InvalidResponse(String),
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("undecodable contract call result: {0}")]
    CallDecode(#[from] alloy_sol_types::Error),
}

/// A log as returned by `eth_getLogs`, restricted to mined logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

/// One position of an `eth_getLogs` topic filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicFilter {
    Any,
    Exact(B256),
    OneOf(Vec<B256>),
}

impl TopicFilter {
    fn to_json(&self) -> Value {
        match self {
            TopicFilter::Any => Value::Null,
            TopicFilter::Exact(topic) => json!(topic),
            TopicFilter::OneOf(topics) => json!(topics),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topics: Vec<TopicFilter>,
    pub range: BlockRange,
}

impl LogFilter {
    fn to_json(&self) -> Value {
        let topics: Vec<Value> = self.topics.iter().map(TopicFilter::to_json).collect();
        json!({
            "address": self.address,
            "topics": topics,
            "fromBlock": format!("{:#x}", self.range.from),
            "toBlock": format!("{:#x}", self.range.to),
        })
    }
}

/// Chain access the indexer needs. Implementations must tolerate concurrent use.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn block_number(&self) -> Result<u64, TransportError>;

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, TransportError>;

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, TransportError>;

    /// Creator recorded by the launch contract for `token`.
    async fn read_token_creator(&self, token: Address) -> Result<Address, TransportError>;

    /// Current value of one of the contract's fee constants, in wei.
    async fn read_fee(&self, fee: FeeKind) -> Result<U256, TransportError>;
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    block_number: Option<U64>,
    transaction_hash: Option<B256>,
    log_index: Option<U64>,
}

impl TryFrom<RpcLog> for RawLog {
    type Error = TransportError;

    fn try_from(log: RpcLog) -> Result<Self, Self::Error> {
        // pending logs carry none of these; a mined log always has all three
        let missing = |field: &str| TransportError::InvalidResponse(format!("log without {field}"));
        let block_number = log.block_number.ok_or_else(|| missing("block number"))?;
        let transaction_hash = log.transaction_hash.ok_or_else(|| missing("transaction hash"))?;
        let log_index = log.log_index.ok_or_else(|| missing("log index"))?;

        Ok(RawLog {
            address: log.address,
            topics: log.topics,
            data: log.data,
            block_number: block_number.to::<u64>(),
            transaction_hash,
            log_index: log_index.to::<u64>(),
        })
    }
}

#[derive(Deserialize)]
struct RpcBlock {
    timestamp: U64,
}

pub struct JsonRpcTransport {
    client: reqwest::Client,
    url: String,
    contract: Address,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(config: &RpcConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.unwrap_or(30_000)))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            contract: config.contract_address,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>, TransportError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response: RpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(TransportError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(response.result)
    }

    async fn call_required<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, TransportError> {
        self.call(method, params)
            .await?
            .ok_or_else(|| TransportError::InvalidResponse(format!("{method} returned no result")))
    }

    /// Read-only call on the launch contract at the latest block.
    async fn eth_call<C: SolCall + Send>(&self, call: C) -> Result<C::Return, TransportError> {
        let data = Bytes::from(call.abi_encode());
        let output: Bytes = self
            .call_required("eth_call", json!([{ "to": self.contract, "data": data }, "latest"]))
            .await?;
        Ok(C::abi_decode_returns(&output, true)?)
    }
}

#[async_trait]
impl Transport for JsonRpcTransport {
    async fn block_number(&self) -> Result<u64, TransportError> {
        let height: U64 = self.call_required("eth_blockNumber", json!([])).await?;
        Ok(height.to::<u64>())
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, TransportError> {
        debug!(
            "eth_getLogs {} blocks {}..={}",
            filter.address, filter.range.from, filter.range.to
        );
        let logs: Vec<RpcLog> = self.call_required("eth_getLogs", json!([filter.to_json()])).await?;
        logs.into_iter().map(RawLog::try_from).collect()
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, TransportError> {
        let block: Option<RpcBlock> = self
            .call("eth_getBlockByNumber", json!([format!("{block_number:#x}"), false]))
            .await?;
        let block = block.ok_or(TransportError::BlockNotFound(block_number))?;
        Ok(block.timestamp.to::<u64>())
    }

    async fn read_token_creator(&self, token: Address) -> Result<Address, TransportError> {
        Ok(self.eth_call(readTokenCreatorCall { token }).await?._0)
    }

    async fn read_fee(&self, fee: FeeKind) -> Result<U256, TransportError> {
        debug!("eth_call {}()", fee.name());
        let wei = match fee {
            FeeKind::Protocol => self.eth_call(PROTOCOL_FEECall {}).await?._0,
            FeeKind::Creator => self.eth_call(CREATOR_FEECall {}).await?._0,
            FeeKind::Caller => self.eth_call(CALLER_FEECall {}).await?._0,
            FeeKind::Burn => self.eth_call(BURN_FEECall {}).await?._0,
        };
        Ok(wei)
    }
}
