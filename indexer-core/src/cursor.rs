use alloy_primitives::Address;
use std::fmt;

/// Blocks per `eth_getLogs` request. Keeps result sets under provider limits.
pub const CHUNK_SIZE: u64 = 10_000;

/// Block at which the launch contract went live. Fresh streams start here.
pub const DEPLOYMENT_BLOCK: u64 = 7_868_796;

/// A logical log stream with its own cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKey {
    /// `TokenCreated` events of the launch contract.
    Tokens,
    /// Purchases and sells of one token.
    Trades(Address),
}

impl StreamKey {
    pub fn records_key(&self) -> String {
        match self {
            StreamKey::Tokens => "discoveredTokens".to_string(),
            StreamKey::Trades(token) => format!("tradeHistory_{token}"),
        }
    }

    pub fn cursor_key(&self) -> String {
        match self {
            StreamKey::Tokens => "lastProcessedBlock".to_string(),
            StreamKey::Trades(token) => format!("lastProcessedBlock_{token}"),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKey::Tokens => write!(f, "tokens"),
            StreamKey::Trades(token) => write!(f, "trades:{token}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCursor {
    pub key: StreamKey,
    pub last_processed_block: u64,
}

impl StreamCursor {
    pub fn new(key: StreamKey, last_processed_block: u64) -> Self {
        Self {
            key,
            last_processed_block,
        }
    }

    /// Moves the cursor forward to `block`. Never moves it back.
    pub fn advance(&mut self, block: u64) {
        self.last_processed_block = self.last_processed_block.max(block);
    }
}

/// Inclusive block range of one log query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

/// Next range to fetch for `cursor`, or `None` once it has reached `current_height`.
///
/// The range starts at the cursor block itself and spans at most `chunk_size` blocks.
pub fn next_chunk(cursor: &StreamCursor, current_height: u64, chunk_size: u64) -> Option<BlockRange> {
    if cursor.last_processed_block >= current_height {
        return None;
    }

    let from = cursor.last_processed_block;
    let span = chunk_size.max(1) - 1;
    let to = from.saturating_add(span).min(current_height);
    Some(BlockRange { from, to })
}
