//! Pre-signed OCSP response caching.
//!
//! [`response`] builds response templates from validated entries and holds
//! the signed [`CachedResponse`]; [`store`] maps serial numbers to cached
//! responses behind an atomically replaced immutable snapshot.

pub mod response;
pub mod store;

pub use response::{CachedResponse, ResponseCacheNotCreated, ResponseStatus, ResponseTemplate};
pub use store::{CacheSnapshot, ReadOnlyCacheStore, ResponseCacheStore};
