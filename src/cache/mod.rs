//! Per-account, TTL-aware JSON file cache for vendor fetch results

pub mod key;
pub mod store;

pub use key::{generate_key, stable_serialize};
pub use store::{CacheEntrySummary, CacheEnvelope, CacheMetadata, CacheStats, CacheStore};
