//! Discovery cache module
//!
//! Per-service-name cache of healthy instances kept fresh by background watches:
//! - `types`: configuration, statistics and error types
//! - `cache`: the `DiscoveryCache` and its first-access initialization
//! - `watcher`: the per-name watch task

pub mod cache;
pub mod types;
mod watcher;

pub use cache::DiscoveryCache;
pub use types::{CacheStats, DiscoveryError, InstanceList, WatchConfig};
