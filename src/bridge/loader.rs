//! Loader Adapter
//!
//! Drives an application `CacheLoader` through the engine's loader hook.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::api::CacheLoader;
use crate::engine::{CacheKey, CacheValue, EngineLoader};
use crate::error::{EngineError, EngineResult};

pub struct LoaderAdapter<K: CacheKey, V> {
    delegate: Arc<dyn CacheLoader<K, V>>,
}

impl<K: CacheKey, V> LoaderAdapter<K, V> {
    pub fn new(delegate: Arc<dyn CacheLoader<K, V>>) -> Self {
        Self { delegate }
    }

    /// The application loader this adapter wraps.
    pub fn delegate(&self) -> &Arc<dyn CacheLoader<K, V>> {
        &self.delegate
    }
}

impl<K: CacheKey, V> Clone for LoaderAdapter<K, V> {
    fn clone(&self) -> Self {
        Self {
            delegate: Arc::clone(&self.delegate),
        }
    }
}

impl<K: CacheKey, V: CacheValue> EngineLoader<K, V> for LoaderAdapter<K, V> {
    fn load(&self, key: &K) -> EngineResult<Option<V>> {
        self.delegate.load(key).map_err(|err| {
            warn!("Cache loader failed for key {:?}: {:#}", key, err);
            EngineError::Loader(err)
        })
    }

    fn load_all(&self, keys: &[K]) -> EngineResult<HashMap<K, V>> {
        let mut loaded = self.delegate.load_all(keys).map_err(|err| {
            warn!("Cache loader failed for {} key(s): {:#}", keys.len(), err);
            EngineError::Loader(err)
        })?;
        // Only the requested keys may populate the cache
        loaded.retain(|key, _| keys.contains(key));
        Ok(loaded)
    }

    fn clone_for(&self, _cache_name: &str) -> EngineResult<Box<dyn EngineLoader<K, V>>> {
        Ok(Box::new(self.clone()))
    }
}

impl<K: CacheKey, V> fmt::Debug for LoaderAdapter<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderAdapter").finish_non_exhaustive()
    }
}
