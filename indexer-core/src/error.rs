use crate::{decoder::DecodeError, store::StoreError, transport::TransportError};
use thiserror::Error;

/// Failure of an indexing cycle. The stream cursor is never advanced past a failed chunk.
///
/// Curve arithmetic is pure and reports its own `MathError` to callers directly.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("storage: {0}")]
    Storage(#[from] StoreError),
}
