pub mod cache;
pub mod config;
pub mod cursor;
pub mod curve;
pub mod decoder;
pub mod error;
pub mod fixed_point;
pub mod indexer;
pub mod models;
pub mod store;
pub mod transport;
