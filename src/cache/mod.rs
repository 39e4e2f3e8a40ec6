//! Capacity-accounted LRU caching, single-shard and sharded.

pub mod lru;
pub mod sharded;

pub use lru::LruCache;
pub use sharded::{ShardKey, ShardedLru};
