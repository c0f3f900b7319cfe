use crate::{
    models::{PricePoints, TokenRecord, TradeKind, TradeRecord},
    transport::RawLog,
};
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{sol, SolEvent};
use thiserror::Error;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    event TokenCreated(address indexed tokenAddress, string name, string symbol, uint256 maxSupply, uint64[4] pricePoints);

    #[derive(Debug, PartialEq, Eq)]
    event TokensPurchased(address indexed token, address indexed minter, uint256 amount, uint256 ethSpent);

    #[derive(Debug, PartialEq, Eq)]
    event TokensSold(address indexed token, address indexed minter, uint256 amount, uint256 ethSpent);

    #[derive(Debug, PartialEq, Eq)]
    function readTokenCreator(address token) external view returns (address);

    function PROTOCOL_FEE() external view returns (uint256);
    function CREATOR_FEE() external view returns (uint256);
    function CALLER_FEE() external view returns (uint256);
    function BURN_FEE() external view returns (uint256);
}

pub const TOKEN_CREATED_TOPIC: B256 = <TokenCreated as SolEvent>::SIGNATURE_HASH;
pub const TOKENS_PURCHASED_TOPIC: B256 = <TokensPurchased as SolEvent>::SIGNATURE_HASH;
pub const TOKENS_SOLD_TOPIC: B256 = <TokensSold as SolEvent>::SIGNATURE_HASH;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("log topic {0:?} matches no known event")]
    UnrecognizedEvent(Option<B256>),
    #[error("expected {expected} but log decoded as {found}")]
    UnexpectedEvent {
        expected: &'static str,
        found: &'static str,
    },
    #[error("malformed {event} log: {source}")]
    Abi {
        event: &'static str,
        #[source]
        source: alloy_sol_types::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeFill {
    pub token: Address,
    pub minter: Address,
    pub amount: U256,
    pub eth_spent: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    TokenCreated {
        token_address: Address,
        name: String,
        symbol: String,
        max_supply: U256,
        price_points: PricePoints,
    },
    TokensPurchased(TradeFill),
    TokensSold(TradeFill),
}

impl ProtocolEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::TokenCreated { .. } => "TokenCreated",
            ProtocolEvent::TokensPurchased(_) => "TokensPurchased",
            ProtocolEvent::TokensSold(_) => "TokensSold",
        }
    }
}

fn decode_as<E: SolEvent>(log: &RawLog, event: &'static str) -> Result<E, DecodeError> {
    E::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(|source| DecodeError::Abi { event, source })
}

/// Decodes a log of the launch contract by its first topic.
///
/// Callers filter logs by topic before decoding, so an unknown topic means the
/// filter and the signature table disagree.
pub fn decode_log(log: &RawLog) -> Result<ProtocolEvent, DecodeError> {
    let Some(topic0) = log.topics.first().copied() else {
        return Err(DecodeError::UnrecognizedEvent(None));
    };

    if topic0 == TOKEN_CREATED_TOPIC {
        let ev: TokenCreated = decode_as(log, "TokenCreated")?;
        Ok(ProtocolEvent::TokenCreated {
            token_address: ev.tokenAddress,
            name: ev.name,
            symbol: ev.symbol,
            max_supply: ev.maxSupply,
            price_points: PricePoints(ev.pricePoints),
        })
    } else if topic0 == TOKENS_PURCHASED_TOPIC {
        let ev: TokensPurchased = decode_as(log, "TokensPurchased")?;
        Ok(ProtocolEvent::TokensPurchased(TradeFill {
            token: ev.token,
            minter: ev.minter,
            amount: ev.amount,
            eth_spent: ev.ethSpent,
        }))
    } else if topic0 == TOKENS_SOLD_TOPIC {
        let ev: TokensSold = decode_as(log, "TokensSold")?;
        Ok(ProtocolEvent::TokensSold(TradeFill {
            token: ev.token,
            minter: ev.minter,
            amount: ev.amount,
            eth_spent: ev.ethSpent,
        }))
    } else {
        Err(DecodeError::UnrecognizedEvent(Some(topic0)))
    }
}

pub fn decode_token_created(log: &RawLog) -> Result<TokenRecord, DecodeError> {
    match decode_log(log)? {
        ProtocolEvent::TokenCreated {
            token_address,
            name,
            symbol,
            max_supply,
            price_points,
        } => Ok(TokenRecord {
            address: token_address,
            name,
            symbol,
            max_supply,
            price_points,
            created_at_block: log.block_number,
        }),
        other => Err(DecodeError::UnexpectedEvent {
            expected: "TokenCreated",
            found: other.name(),
        }),
    }
}

/// Decodes a purchase or sell and tags it as a creator trade when the minter is `creator`.
pub fn decode_trade(log: &RawLog, timestamp: u64, creator: Address) -> Result<TradeRecord, DecodeError> {
    let (kind, fill) = match decode_log(log)? {
        ProtocolEvent::TokensPurchased(fill) => (TradeKind::Purchase, fill),
        ProtocolEvent::TokensSold(fill) => (TradeKind::Sell, fill),
        other => {
            return Err(DecodeError::UnexpectedEvent {
                expected: "TokensPurchased or TokensSold",
                found: other.name(),
            })
        }
    };

    // Address equality is byte equality, so hex casing does not matter here.
    let is_creator_trade = fill.minter == creator;

    Ok(TradeRecord {
        token_address: fill.token,
        kind,
        trader: fill.minter,
        amount: fill.amount,
        eth_spent: fill.eth_spent,
        block_number: log.block_number,
        timestamp,
        is_creator_trade,
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy_primitives::{keccak256, Bytes};

    pub(crate) fn raw_log<E: SolEvent>(event: &E, block_number: u64, log_index: u64) -> RawLog {
        let data = event.encode_log_data();
        RawLog {
            address: Address::repeat_byte(0x54),
            topics: data.topics().to_vec(),
            data: data.data.clone(),
            block_number,
            transaction_hash: B256::repeat_byte(log_index as u8),
            log_index,
        }
    }

    pub(crate) fn token_created(token: Address, name: &str) -> TokenCreated {
        TokenCreated {
            tokenAddress: token,
            name: name.to_string(),
            symbol: name.to_uppercase(),
            maxSupply: U256::from(1_000_000u64),
            pricePoints: [100, 200, 150, 300],
        }
    }

    #[test]
    fn test_signature_topics_match_canonical_signatures() {
        assert_eq!(
            TOKEN_CREATED_TOPIC,
            keccak256("TokenCreated(address,string,string,uint256,uint64[4])")
        );
        assert_eq!(
            TOKENS_PURCHASED_TOPIC,
            keccak256("TokensPurchased(address,address,uint256,uint256)")
        );
        assert_eq!(TOKENS_SOLD_TOPIC, keccak256("TokensSold(address,address,uint256,uint256)"));
    }

    #[test]
    fn test_decode_token_created() {
        let token = Address::repeat_byte(0xaa);
        let log = raw_log(&token_created(token, "glot"), 7_870_000, 0);

        let record = decode_token_created(&log).unwrap();
        assert_eq!(record.address, token);
        assert_eq!(record.name, "glot");
        assert_eq!(record.symbol, "GLOT");
        assert_eq!(record.max_supply, U256::from(1_000_000u64));
        assert_eq!(record.price_points, PricePoints([100, 200, 150, 300]));
        assert_eq!(record.created_at_block, 7_870_000);
    }

    #[test]
    fn test_decode_trades_and_tag_creator() {
        let token = Address::repeat_byte(0xaa);
        let creator = Address::repeat_byte(0xcc);
        let buy = TokensPurchased {
            token,
            minter: creator,
            amount: U256::from(500u64),
            ethSpent: U256::from(42u64),
        };
        let sell = TokensSold {
            token,
            minter: Address::repeat_byte(0xdd),
            amount: U256::from(100u64),
            ethSpent: U256::from(9u64),
        };

        let bought = decode_trade(&raw_log(&buy, 10, 1), 1_700_000_000, creator).unwrap();
        assert_eq!(bought.kind, TradeKind::Purchase);
        assert_eq!(bought.trader, creator);
        assert_eq!(bought.amount, U256::from(500u64));
        assert_eq!(bought.eth_spent, U256::from(42u64));
        assert_eq!(bought.timestamp, 1_700_000_000);
        assert_eq!(bought.log_index, 1);
        assert!(bought.is_creator_trade);

        let sold = decode_trade(&raw_log(&sell, 11, 2), 1_700_000_012, creator).unwrap();
        assert_eq!(sold.kind, TradeKind::Sell);
        assert!(!sold.is_creator_trade);
    }

    #[test]
    fn test_zero_creator_marks_no_trade_as_creator() {
        let buy = TokensPurchased {
            token: Address::repeat_byte(0xaa),
            minter: Address::repeat_byte(0x01),
            amount: U256::from(1u64),
            ethSpent: U256::from(1u64),
        };
        let trade = decode_trade(&raw_log(&buy, 1, 0), 0, Address::ZERO).unwrap();
        assert!(!trade.is_creator_trade);
    }

    #[test]
    fn test_unrecognized_topic_is_rejected() {
        let mut log = raw_log(&token_created(Address::ZERO, "x"), 1, 0);
        let bogus = keccak256("Transfer(address,address,uint256)");
        log.topics[0] = bogus;

        assert!(matches!(
            decode_log(&log),
            Err(DecodeError::UnrecognizedEvent(Some(topic))) if topic == bogus
        ));

        log.topics.clear();
        assert!(matches!(decode_log(&log), Err(DecodeError::UnrecognizedEvent(None))));
    }

    #[test]
    fn test_wrong_stream_event_is_rejected() {
        let log = raw_log(&token_created(Address::ZERO, "x"), 1, 0);
        assert!(matches!(
            decode_trade(&log, 0, Address::ZERO),
            Err(DecodeError::UnexpectedEvent { found: "TokenCreated", .. })
        ));
    }

    #[test]
    fn test_truncated_data_is_a_decode_error() {
        let buy = TokensPurchased {
            token: Address::repeat_byte(0xaa),
            minter: Address::repeat_byte(0x01),
            amount: U256::from(1u64),
            ethSpent: U256::from(1u64),
        };
        let mut log = raw_log(&buy, 1, 0);
        log.data = Bytes::copy_from_slice(&log.data[..16]);

        assert!(matches!(
            decode_log(&log),
            Err(DecodeError::Abi { event: "TokensPurchased", .. })
        ));
    }
}
