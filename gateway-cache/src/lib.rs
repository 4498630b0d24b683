//! KV Cache (C7): namespaced string-keyed store with TTL, pattern
//! invalidation and counter ops.

mod freshness;
mod kv;

pub use freshness::Freshness;
pub use kv::{KvCache, LmdbKvCache};
