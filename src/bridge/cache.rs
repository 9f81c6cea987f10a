//! Cache Façade
//!
//! Standard cache operations over an owned engine cache. Read-through and
//! write-through decide whether the engine consults the loader and writer.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::info;

use crate::api::{CacheEntryListener, CacheLoader, CacheWriter, NotificationScope, Status};
use crate::bridge::{
    adapt_status, BridgeConfiguration, BridgeManager, ListenerAdapter, ListenerRegistration,
    LoaderAdapter, WriterAdapter,
};
use crate::engine::{CacheKey, CacheValue, EngineCache, EngineStats};
use crate::error::{CacheError, Result};

pub struct BridgeCache<K: CacheKey, V: CacheValue> {
    name: String,
    manager: Weak<BridgeManager>,
    engine: Arc<EngineCache<K, V>>,
    configuration: BridgeConfiguration,
    loader: Option<Arc<LoaderAdapter<K, V>>>,
    writer: Option<Arc<WriterAdapter<K, V>>>,
    listeners: RwLock<Vec<ListenerRegistration<K, V>>>,
    stopped: AtomicBool,
}

impl<K: CacheKey, V: CacheValue> BridgeCache<K, V> {
    pub(crate) fn new(
        manager: Weak<BridgeManager>,
        engine: Arc<EngineCache<K, V>>,
        configuration: BridgeConfiguration,
        loader: Option<Arc<LoaderAdapter<K, V>>>,
        writer: Option<Arc<WriterAdapter<K, V>>>,
        listeners: Vec<ListenerRegistration<K, V>>,
    ) -> Self {
        Self {
            name: engine.name().to_string(),
            manager,
            engine,
            configuration,
            loader,
            writer,
            listeners: RwLock::new(listeners),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stopped once this façade or its engine cache has been stopped.
    pub fn status(&self) -> Status {
        if self.stopped.load(Ordering::Acquire) {
            return Status::Stopped;
        }
        adapt_status(self.engine.status())
    }

    pub fn configuration(&self) -> &BridgeConfiguration {
        &self.configuration
    }

    /// The manager this cache belongs to, while it is still around.
    pub fn cache_manager(&self) -> Option<Arc<BridgeManager>> {
        self.manager.upgrade()
    }

    /// The application loader the cache was built with.
    pub fn loader(&self) -> Option<Arc<dyn CacheLoader<K, V>>> {
        self.loader.as_ref().map(|adapter| Arc::clone(adapter.delegate()))
    }

    /// The application writer the cache was built with.
    pub fn writer(&self) -> Option<Arc<dyn CacheWriter<K, V>>> {
        self.writer.as_ref().map(|adapter| Arc::clone(adapter.delegate()))
    }

    pub fn engine(&self) -> &Arc<EngineCache<K, V>> {
        &self.engine
    }

    // == Read Operations ==
    pub fn get(&self, key: &K) -> Result<Option<Arc<V>>> {
        self.ensure_started()?;
        let value = if self.configuration.read_through {
            self.engine.get_with_loader(key)?
        } else {
            self.engine.get(key)?
        };
        Ok(value)
    }

    pub fn get_all(&self, keys: &[K]) -> Result<HashMap<K, Arc<V>>> {
        self.ensure_started()?;
        let values = if self.configuration.read_through {
            self.engine.get_all_with_loader(keys)?
        } else {
            self.engine.get_all(keys)?
        };
        Ok(values)
    }

    pub fn contains_key(&self, key: &K) -> Result<bool> {
        self.ensure_started()?;
        Ok(self.engine.contains_key(key)?)
    }

    /// Loads `keys` through the configured loader whether or not read-through
    /// is enabled. Returns how many values were loaded.
    pub fn load_all(&self, keys: &[K], replace_existing: bool) -> Result<usize> {
        self.ensure_started()?;
        Ok(self.engine.load_all(keys, replace_existing)?)
    }

    /// Snapshot of every live entry.
    pub fn entries(&self) -> Result<Vec<(K, Arc<V>)>> {
        self.ensure_started()?;
        Ok(self.engine.entries()?)
    }

    // == Write Operations ==
    pub fn put(&self, key: K, value: V) -> Result<()> {
        self.get_and_put(key, value).map(|_| ())
    }

    pub fn get_and_put(&self, key: K, value: V) -> Result<Option<Arc<V>>> {
        self.ensure_started()?;
        Ok(self.engine.put(key, value, self.configuration.write_through)?)
    }

    pub fn put_all(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<()> {
        self.ensure_started()?;
        let entries: Vec<(K, V)> = entries.into_iter().collect();
        Ok(self.engine.put_all(entries, self.configuration.write_through)?)
    }

    /// Stores the value unless the key is present. Returns whether it was stored.
    pub fn put_if_absent(&self, key: K, value: V) -> Result<bool> {
        self.ensure_started()?;
        let existing = self
            .engine
            .put_if_absent(key, value, self.configuration.write_through)?;
        Ok(existing.is_none())
    }

    pub fn replace(&self, key: K, value: V) -> Result<bool> {
        Ok(self.get_and_replace(key, value)?.is_some())
    }

    pub fn replace_if_equals(&self, key: K, old_value: &V, new_value: V) -> Result<bool>
    where
        V: PartialEq,
    {
        self.ensure_started()?;
        Ok(self.engine.replace_if_equals(
            key,
            old_value,
            new_value,
            self.configuration.write_through,
        )?)
    }

    pub fn get_and_replace(&self, key: K, value: V) -> Result<Option<Arc<V>>> {
        self.ensure_started()?;
        Ok(self.engine.replace(key, value, self.configuration.write_through)?)
    }

    // == Remove Operations ==
    pub fn remove(&self, key: &K) -> Result<bool> {
        Ok(self.get_and_remove(key)?.is_some())
    }

    pub fn remove_if_equals(&self, key: &K, old_value: &V) -> Result<bool>
    where
        V: PartialEq,
    {
        self.ensure_started()?;
        Ok(self
            .engine
            .remove_if_equals(key, old_value, self.configuration.write_through)?)
    }

    pub fn get_and_remove(&self, key: &K) -> Result<Option<Arc<V>>> {
        self.ensure_started()?;
        Ok(self.engine.remove(key, self.configuration.write_through)?)
    }

    pub fn remove_all_keys(&self, keys: &[K]) -> Result<()> {
        self.ensure_started()?;
        Ok(self.engine.remove_all(keys, self.configuration.write_through)?)
    }

    pub fn remove_all(&self) -> Result<()> {
        self.ensure_started()?;
        Ok(self
            .engine
            .remove_all_entries(self.configuration.write_through)?)
    }

    // == Listeners ==
    pub fn register_cache_entry_listener(
        &self,
        listener: Arc<dyn CacheEntryListener<K, V>>,
        scope: NotificationScope,
        synchronous: bool,
    ) -> Result<()> {
        self.ensure_started()?;
        let registration = ListenerRegistration::new(listener, scope, synchronous);
        self.engine
            .register_listener(Arc::new(ListenerAdapter::new(registration.clone())));
        self.listeners.write().push(registration);
        Ok(())
    }

    pub fn listener_registrations(&self) -> Vec<ListenerRegistration<K, V>> {
        self.listeners.read().clone()
    }

    // == Statistics ==
    /// Engine statistics, `None` unless statistics were enabled.
    pub fn statistics(&self) -> Result<Option<EngineStats>> {
        self.ensure_started()?;
        Ok(self
            .configuration
            .statistics_enabled
            .then(|| self.engine.stats()))
    }

    // == Unwrap ==
    /// Returns this cache or its engine cache as `T`.
    pub fn unwrap<T: Any + Send + Sync>(self: &Arc<Self>) -> Result<Arc<T>> {
        let this = Arc::clone(self) as Arc<dyn Any + Send + Sync>;
        if let Ok(found) = this.downcast::<T>() {
            return Ok(found);
        }

        let engine = Arc::clone(&self.engine) as Arc<dyn Any + Send + Sync>;
        engine.downcast::<T>().map_err(|_| {
            CacheError::IllegalArgument(format!(
                "Cache '{}' cannot be unwrapped to {}",
                self.name,
                type_name::<T>()
            ))
        })
    }

    // == Lifecycle ==
    /// Stops the cache, releases its engine cache and frees its name in the
    /// manager, so a cache of that name can be built again.
    pub fn stop(&self) -> Result<()> {
        self.ensure_started()?;
        self.mark_stopped();
        self.engine.dispose();
        if let Some(manager) = self.manager.upgrade() {
            manager.forget(&self.name);
        }
        info!("Cache '{}' stopped", self.name);
        Ok(())
    }

    /// Stops this façade only, leaving the engine cache to its manager.
    pub(crate) fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn ensure_started(&self) -> Result<()> {
        match self.status() {
            Status::Started => Ok(()),
            status => Err(CacheError::IllegalState(format!(
                "Cache '{}' is {}",
                self.name, status
            ))),
        }
    }
}

impl<K: CacheKey, V: CacheValue> fmt::Debug for BridgeCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeCache")
            .field("name", &self.name)
            .field("status", &self.status())
            .field("configuration", &self.configuration)
            .finish_non_exhaustive()
    }
}
