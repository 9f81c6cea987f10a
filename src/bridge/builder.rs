//! Cache Builder
//!
//! Collects the configuration of a new cache and builds it into its manager.
//! `build` consumes the builder, so a built configuration cannot change.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::api::{
    CacheEntryListener, CacheLoader, CacheWriter, Expiry, ExpiryType, IsolationLevel,
    NotificationScope, TransactionMode,
};
use crate::bridge::{
    BridgeCache, BridgeConfiguration, BridgeManager, ListenerAdapter, ListenerRegistration,
    LoaderAdapter, WriterAdapter,
};
use crate::engine::{CacheKey, CacheValue, EngineCache, EngineLoader, EngineWriter};
use crate::error::{CacheError, Result};

pub struct BridgeCacheBuilder<K: CacheKey, V: CacheValue> {
    name: String,
    manager: Arc<BridgeManager>,
    loader: Option<Arc<dyn CacheLoader<K, V>>>,
    writer: Option<Arc<dyn CacheWriter<K, V>>>,
    listeners: Vec<ListenerRegistration<K, V>>,
    store_by_value: bool,
    statistics_enabled: bool,
    read_through: bool,
    write_through: bool,
    isolation_level: IsolationLevel,
    transaction_mode: TransactionMode,
    expiry_accessed: Expiry,
    expiry_modified: Expiry,
}

impl<K: CacheKey, V: CacheValue> BridgeCacheBuilder<K, V> {
    pub(crate) fn new(name: &str, manager: Arc<BridgeManager>) -> Self {
        Self {
            name: name.to_string(),
            manager,
            loader: None,
            writer: None,
            listeners: Vec::new(),
            store_by_value: true,
            statistics_enabled: false,
            read_through: false,
            write_through: false,
            isolation_level: IsolationLevel::None,
            transaction_mode: TransactionMode::None,
            expiry_accessed: Expiry::ETERNAL,
            expiry_modified: Expiry::ETERNAL,
        }
    }

    // == Setters ==
    pub fn set_cache_loader(mut self, loader: Arc<dyn CacheLoader<K, V>>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn set_cache_writer(mut self, writer: Arc<dyn CacheWriter<K, V>>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn register_cache_entry_listener(
        mut self,
        listener: Arc<dyn CacheEntryListener<K, V>>,
        scope: NotificationScope,
        synchronous: bool,
    ) -> Self {
        self.listeners
            .push(ListenerRegistration::new(listener, scope, synchronous));
        self
    }

    pub fn set_store_by_value(mut self, store_by_value: bool) -> Self {
        self.store_by_value = store_by_value;
        self
    }

    pub fn set_transaction_enabled(
        mut self,
        isolation_level: IsolationLevel,
        mode: TransactionMode,
    ) -> Self {
        self.isolation_level = isolation_level;
        self.transaction_mode = mode;
        self
    }

    pub fn set_statistics_enabled(mut self, enabled: bool) -> Self {
        self.statistics_enabled = enabled;
        self
    }

    pub fn set_read_through(mut self, read_through: bool) -> Self {
        self.read_through = read_through;
        self
    }

    pub fn set_write_through(mut self, write_through: bool) -> Self {
        self.write_through = write_through;
        self
    }

    pub fn set_expiry(mut self, kind: ExpiryType, expiry: Expiry) -> Self {
        match kind {
            ExpiryType::Accessed => self.expiry_accessed = expiry,
            ExpiryType::Modified => self.expiry_modified = expiry,
        }
        self
    }

    // == Build ==
    /// Creates the engine cache, wraps it and registers both with the manager.
    pub fn build(self) -> Result<Arc<BridgeCache<K, V>>> {
        self.manager.ensure_started()?;
        self.validate()?;

        let time_to_idle_seconds = whole_seconds(ExpiryType::Accessed, self.expiry_accessed)?;
        let time_to_live_seconds = whole_seconds(ExpiryType::Modified, self.expiry_modified)?;

        // Values of immutable types are shared even by store-by-value caches
        let copy = self.store_by_value && !self.manager.is_immutable::<V>();

        let mut config = self
            .manager
            .engine_manager()
            .default_cache_config(&self.name);
        config.eternal = time_to_idle_seconds == 0 && time_to_live_seconds == 0;
        config.time_to_idle_seconds = time_to_idle_seconds;
        config.time_to_live_seconds = time_to_live_seconds;
        config.copy_on_read = copy;
        config.copy_on_write = copy;
        config.statistics = self.statistics_enabled;

        let engine = EngineCache::new(config);
        let loader = self.loader.map(|delegate| Arc::new(LoaderAdapter::new(delegate)));
        if let Some(adapter) = &loader {
            engine.register_loader(Arc::clone(adapter) as Arc<dyn EngineLoader<K, V>>);
        }
        let writer = self.writer.map(|delegate| Arc::new(WriterAdapter::new(delegate)));
        if let Some(adapter) = &writer {
            engine.register_writer(Arc::clone(adapter) as Arc<dyn EngineWriter<K, V>>);
        }
        for registration in &self.listeners {
            engine.register_listener(Arc::new(ListenerAdapter::new(registration.clone())));
        }

        let configuration = BridgeConfiguration {
            store_by_value: self.store_by_value,
            read_through: self.read_through,
            write_through: self.write_through,
            statistics_enabled: self.statistics_enabled,
            isolation_level: self.isolation_level,
            transaction_mode: self.transaction_mode,
            expiry_accessed: self.expiry_accessed,
            expiry_modified: self.expiry_modified,
        };
        let listeners = self.listeners;

        let cache = self.manager.register(engine, |manager, engine| {
            BridgeCache::new(manager, engine, configuration, loader, writer, listeners)
        })?;

        info!(
            "Cache '{}' built in manager '{}'",
            cache.name(),
            self.manager.name()
        );
        Ok(cache)
    }

    fn validate(&self) -> Result<()> {
        if self.transaction_mode != TransactionMode::None {
            return Err(CacheError::Unsupported(format!(
                "cache '{}': transactions are not supported",
                self.name
            )));
        }
        if self.read_through && self.loader.is_none() {
            return Err(CacheError::InvalidConfiguration(format!(
                "cache '{}': read-through requires a cache loader",
                self.name
            )));
        }
        if self.write_through && self.writer.is_none() {
            return Err(CacheError::InvalidConfiguration(format!(
                "cache '{}': write-through requires a cache writer",
                self.name
            )));
        }
        Ok(())
    }
}

impl<K: CacheKey, V: CacheValue> fmt::Debug for BridgeCacheBuilder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeCacheBuilder")
            .field("name", &self.name)
            .field("store_by_value", &self.store_by_value)
            .field("read_through", &self.read_through)
            .field("write_through", &self.write_through)
            .field("expiry_accessed", &self.expiry_accessed)
            .field("expiry_modified", &self.expiry_modified)
            .finish_non_exhaustive()
    }
}

/// Engine seconds for an expiry: zero when eternal, otherwise rounded up.
/// The engine cannot express a finite expiry shorter than one second.
fn whole_seconds(kind: ExpiryType, expiry: Expiry) -> Result<u64> {
    let Some(duration) = expiry.as_duration() else {
        return Ok(0);
    };
    if duration < Duration::from_secs(1) {
        return Err(CacheError::InvalidConfiguration(format!(
            "{:?} expiry of {:?} is shorter than one second",
            kind, duration
        )));
    }
    let rounded_up = u64::from(duration.subsec_nanos() > 0);
    Ok(duration.as_secs().saturating_add(rounded_up))
}
