//! Cache Bridge - the standard cache API over an in-process cache engine
//!
//! Applications obtain a manager from [`caching`], build or look up caches
//! on it and use them through the standard operations. Storage, expiry and
//! eviction are done by the [`engine`].

pub mod api;
pub mod bridge;
pub mod caching;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod tasks;

pub use bridge::{BridgeCache, BridgeCacheBuilder, BridgeConfiguration, BridgeManager};
pub use caching::{
    close, close_scope, get_cache_manager, get_cache_manager_in, get_cache_manager_named, Scope,
};
pub use error::{CacheError, EngineError, Result};
pub use logging::init_logging;
pub use tasks::spawn_expiry_task;
