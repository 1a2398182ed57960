//! # Result Cache
//!
//! TTL-based cache of directory lookups shared by every entity command
//! service. Reads go cache-first; every mutation invalidates the mutated
//! entity's [`CacheScope`] before returning.

pub mod keys;
pub mod result_cache;

pub use keys::{normalize_upn, CacheKey, CacheKind, CacheScope};
pub use result_cache::{CacheGeneration, CacheStats, CacheTtls, CacheValue, ResultCache};
