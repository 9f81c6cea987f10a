//! Engine Module
//!
//! The backing in-process cache engine: element storage with TTI/TTL
//! expiration, LRU eviction, copy-on-read/write, loader and writer
//! extensions, listeners and named managers.

mod element;
mod extension;
mod lru;
mod manager;
mod stats;
mod store;


use std::fmt::Debug;
use std::hash::Hash;

use serde::Serialize;

// Re-export public types
pub use element::{Element, ExpiryPolicy};
pub use extension::{EngineEntry, EngineEvent, EngineListener, EngineLoader, EngineWriter};
pub use lru::LruTracker;
pub use manager::{EngineManager, ManagedCache};
pub use stats::EngineStats;
pub use store::EngineCache;

// == Engine Status ==
/// Lifecycle state of an engine cache or manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EngineStatus {
    Uninitialised,
    Alive,
    Shutdown,
}

// == Key / Value Bounds ==
/// Requirements on cache keys.
pub trait CacheKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Requirements on cache values. `Clone` backs the copy-on-read/write
/// strategy used for store-by-value caches.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}
