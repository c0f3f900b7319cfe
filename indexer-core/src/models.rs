use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

/// The four cubic Bézier control points (P0..P3) of a token's price curve, in gwei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricePoints(pub [u64; 4]);

impl PricePoints {
    /// Returns `None` unless exactly four points are given.
    pub fn from_slice(points: &[u64]) -> Option<Self> {
        let arr: [u64; 4] = points.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn to_wei(&self) -> [U256; 4] {
        self.0.map(|p| U256::from(p) * crate::fixed_point::GWEI)
    }

    pub fn as_f64(&self) -> [f64; 4] {
        self.0.map(|p| p as f64)
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    #[serde_as(as = "DisplayFromStr")]
    pub max_supply: U256,
    pub price_points: PricePoints,
    pub created_at_block: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    Purchase,
    Sell,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub token_address: Address,
    pub kind: TradeKind,
    pub trader: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub amount: U256,
    #[serde_as(as = "DisplayFromStr")]
    pub eth_spent: U256,
    pub block_number: u64,
    pub timestamp: u64,
    pub is_creator_trade: bool,
    pub transaction_hash: B256,
    pub log_index: u64,
}

impl TradeRecord {
    pub fn block_time(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.timestamp).ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }
}

/// A flat per-trade fee charged by the launch contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeeKind {
    Protocol,
    Creator,
    Caller,
    Burn,
}

impl FeeKind {
    pub const ALL: [FeeKind; 4] = [FeeKind::Protocol, FeeKind::Creator, FeeKind::Caller, FeeKind::Burn];

    /// Name of the contract constant holding this fee.
    pub fn name(self) -> &'static str {
        match self {
            FeeKind::Protocol => "PROTOCOL_FEE",
            FeeKind::Creator => "CREATOR_FEE",
            FeeKind::Caller => "CALLER_FEE",
            FeeKind::Burn => "BURN_FEE",
        }
    }

    /// Value used when the contract cannot be read, in wei.
    pub fn default_wei(self) -> U256 {
        let wei: u64 = match self {
            FeeKind::Protocol => 1_500_000_000_000_000,
            FeeKind::Creator | FeeKind::Caller => 1_000_000_000_000_000,
            FeeKind::Burn => 3_500_000_000_000_000,
        };
        U256::from(wei)
    }
}

/// All four contract fees, in wei.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSchedule {
    #[serde_as(as = "DisplayFromStr")]
    pub protocol: U256,
    #[serde_as(as = "DisplayFromStr")]
    pub creator: U256,
    #[serde_as(as = "DisplayFromStr")]
    pub caller: U256,
    #[serde_as(as = "DisplayFromStr")]
    pub burn: U256,
}

impl FeeSchedule {
    pub fn get(&self, fee: FeeKind) -> U256 {
        match fee {
            FeeKind::Protocol => self.protocol,
            FeeKind::Creator => self.creator,
            FeeKind::Caller => self.caller,
            FeeKind::Burn => self.burn,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            protocol: FeeKind::Protocol.default_wei(),
            creator: FeeKind::Creator.default_wei(),
            caller: FeeKind::Caller.default_wei(),
            burn: FeeKind::Burn.default_wei(),
        }
    }
}

/// One point of a sampled price curve, used for drawing.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveSample {
    pub progress_fraction: f64,
    #[serde_as(as = "DisplayFromStr")]
    pub price_wei: U256,
    pub is_step_boundary: bool,
}
