//! Caching utilities for NexusDB.
//!
//! - **LRU Cache**: Least Recently Used cache with O(1) operations, used to
//!   memoize parsed SQL
//! - **Statistics**: hit/miss/eviction counters
//!
//! # Example
//!
//! ```rust
//! use nexus_cache::lru::LruCache;
//!
//! let mut cache = LruCache::new(100);
//! cache.insert("key1", "value1");
//! assert_eq!(cache.get(&"key1"), Some(&"value1"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lru;
pub mod stats;

pub use lru::{LruCache, SyncLruCache};
pub use stats::{CacheStats, CacheStatsSnapshot};
