//! Engine Cache Module
//!
//! Main cache engine combining HashMap storage with LRU tracking, TTI/TTL
//! expiration, copy strategies and loader/writer/listener extensions.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::engine::{
    CacheKey, CacheValue, Element, EngineEntry, EngineEvent, EngineListener, EngineLoader,
    EngineStats, EngineStatus, EngineWriter, ExpiryPolicy, LruTracker,
};
use crate::error::{EngineError, EngineResult};

/// Events collected under the store lock, delivered once it is released.
type Events<K, V> = Vec<(EngineEvent, Element<K, V>)>;

// == Store ==
/// Lock-protected state of one cache.
struct Store<K, V> {
    elements: HashMap<K, Element<K, V>>,
    lru: LruTracker<K>,
    stats: EngineStats,
    policy: ExpiryPolicy,
    max_entries: usize,
}

impl<K: CacheKey, V: CacheValue> Store<K, V> {
    fn new(policy: ExpiryPolicy, max_entries: usize) -> Self {
        Self {
            elements: HashMap::new(),
            lru: LruTracker::new(),
            stats: EngineStats::new(),
            policy,
            max_entries,
        }
    }

    /// Drops `key` if it has expired. Returns true when something was dropped.
    fn expire(&mut self, key: &K, events: &mut Events<K, V>) -> bool {
        let expired = self
            .elements
            .get(key)
            .map(|element| element.is_expired(&self.policy))
            .unwrap_or(false);

        if expired {
            if let Some(element) = self.elements.remove(key) {
                self.lru.remove(key);
                self.stats.record_expiration();
                self.stats.set_total_entries(self.elements.len());
                events.push((EngineEvent::Expired, element));
            }
        }
        expired
    }

    /// Drops every expired element, returning how many were dropped.
    fn expire_all(&mut self, events: &mut Events<K, V>) -> usize {
        let expired_keys: Vec<K> = self
            .elements
            .iter()
            .filter(|(_, element)| element.is_expired(&self.policy))
            .map(|(key, _)| key.clone())
            .collect();

        expired_keys
            .iter()
            .filter(|key| self.expire(key, events))
            .count()
    }

    /// Reads a live element, recording the hit or miss.
    fn lookup(&mut self, key: &K, events: &mut Events<K, V>) -> Option<Arc<V>> {
        self.expire(key, events);
        let found = self.elements.get_mut(key).map(|element| {
            element.touch();
            Arc::clone(element.shared_value())
        });

        if found.is_some() {
            self.stats.record_hit();
            self.lru.touch(key);
        } else {
            self.stats.record_miss();
        }
        found
    }

    /// Live value for `key` without touching access metadata.
    fn peek(&mut self, key: &K, events: &mut Events<K, V>) -> Option<Arc<V>> {
        self.expire(key, events);
        self.elements
            .get(key)
            .map(|element| Arc::clone(element.shared_value()))
    }

    /// Stores an element, evicting the least recently used one at capacity.
    /// Returns the element it replaced.
    fn insert(&mut self, element: Element<K, V>, events: &mut Events<K, V>) -> Option<Element<K, V>> {
        let key = element.key().clone();
        self.expire(&key, events);

        let is_overwrite = self.elements.contains_key(&key);
        if !is_overwrite && self.max_entries > 0 && self.elements.len() >= self.max_entries {
            if let Some(evicted_key) = self.lru.evict_oldest() {
                if let Some(evicted) = self.elements.remove(&evicted_key) {
                    self.stats.record_eviction();
                    events.push((EngineEvent::Evicted, evicted));
                }
            }
        }

        self.lru.touch(&key);
        let previous = self.elements.insert(key, element.clone());
        self.stats.record_put();
        self.stats.set_total_entries(self.elements.len());

        let event = if previous.is_some() {
            EngineEvent::Updated
        } else {
            EngineEvent::Put
        };
        events.push((event, element));
        previous
    }

    fn remove(&mut self, key: &K, events: &mut Events<K, V>) -> Option<Element<K, V>> {
        let removed = self.elements.remove(key);
        if let Some(element) = &removed {
            self.lru.remove(key);
            self.stats.record_removal();
            self.stats.set_total_entries(self.elements.len());
            events.push((EngineEvent::Removed, element.clone()));
        }
        removed
    }

    fn clear(&mut self) {
        self.elements.clear();
        self.lru.clear();
        self.stats.set_total_entries(0);
    }
}

// == Engine Cache ==
/// A named engine cache.
///
/// Every data operation requires the cache to be alive. Writers run while the
/// store lock is held and must not call back into the same cache.
pub struct EngineCache<K, V> {
    config: CacheConfig,
    status: RwLock<EngineStatus>,
    store: Mutex<Store<K, V>>,
    loader: RwLock<Option<Arc<dyn EngineLoader<K, V>>>>,
    writer: RwLock<Option<Arc<dyn EngineWriter<K, V>>>>,
    listeners: RwLock<Vec<Arc<dyn EngineListener<K, V>>>>,
}

impl<K: CacheKey, V: CacheValue> EngineCache<K, V> {
    // == Constructor ==
    /// Creates an uninitialised cache; it becomes usable once added to a
    /// manager or explicitly initialised.
    pub fn new(config: CacheConfig) -> Self {
        let policy = ExpiryPolicy::from_config(&config);
        let max_entries = config.max_entries_local_heap;
        Self {
            config,
            status: RwLock::new(EngineStatus::Uninitialised),
            store: Mutex::new(Store::new(policy, max_entries)),
            loader: RwLock::new(None),
            writer: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.read()
    }

    // == Extensions ==
    pub fn register_loader(&self, loader: Arc<dyn EngineLoader<K, V>>) {
        if self.status() == EngineStatus::Alive {
            loader.init();
        }
        *self.loader.write() = Some(loader);
    }

    pub fn loader(&self) -> Option<Arc<dyn EngineLoader<K, V>>> {
        self.loader.read().clone()
    }

    pub fn register_writer(&self, writer: Arc<dyn EngineWriter<K, V>>) {
        if self.status() == EngineStatus::Alive {
            writer.init();
        }
        *self.writer.write() = Some(writer);
    }

    pub fn writer(&self) -> Option<Arc<dyn EngineWriter<K, V>>> {
        self.writer.read().clone()
    }

    pub fn register_listener(&self, listener: Arc<dyn EngineListener<K, V>>) {
        self.listeners.write().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    // == Lifecycle ==
    /// Moves an uninitialised cache to alive and initialises its extensions.
    pub fn initialise(&self) -> EngineResult<()> {
        {
            let mut status = self.status.write();
            match *status {
                EngineStatus::Alive => return Ok(()),
                EngineStatus::Shutdown => return Err(EngineError::NotAlive(self.name().to_string())),
                EngineStatus::Uninitialised => *status = EngineStatus::Alive,
            }
        }

        if let Some(loader) = self.loader() {
            loader.init();
        }
        if let Some(writer) = self.writer() {
            writer.init();
        }
        debug!("Cache '{}' initialised", self.name());
        Ok(())
    }

    /// Shuts the cache down, releasing its elements and extensions.
    /// Disposing twice is a no-op.
    pub fn dispose(&self) {
        {
            let mut status = self.status.write();
            if *status == EngineStatus::Shutdown {
                return;
            }
            *status = EngineStatus::Shutdown;
        }

        if let Some(loader) = self.loader() {
            loader.dispose();
        }
        if let Some(writer) = self.writer() {
            writer.dispose();
        }
        for listener in self.listeners.read().iter() {
            listener.dispose();
        }
        self.store.lock().clear();
        debug!("Cache '{}' disposed", self.name());
    }

    /// Creates an uninitialised cache with this configuration under another
    /// name. Loader and writer are cloned through their `clone_for` hooks,
    /// listeners are not carried over.
    pub fn derive(&self, name: &str) -> EngineResult<EngineCache<K, V>> {
        let mut config = self.config.clone();
        config.name = name.to_string();

        let derived = EngineCache::new(config);
        if let Some(loader) = self.loader() {
            derived.register_loader(Arc::from(loader.clone_for(name)?));
        }
        if let Some(writer) = self.writer() {
            derived.register_writer(Arc::from(writer.clone_for(name)?));
        }
        Ok(derived)
    }

    // == Read Operations ==
    /// Retrieves a live value.
    pub fn get(&self, key: &K) -> EngineResult<Option<Arc<V>>> {
        let found = self.with_store(|store, events| Ok(store.lookup(key, events)))?;
        Ok(found.map(|value| self.copy_for_read(&value)))
    }

    /// Retrieves a value, consulting the loader on a miss and storing what
    /// it returns.
    pub fn get_with_loader(&self, key: &K) -> EngineResult<Option<Arc<V>>> {
        if let Some(value) = self.get(key)? {
            return Ok(Some(value));
        }
        let Some(loader) = self.loader() else {
            return Ok(None);
        };

        match loader.load(key)? {
            Some(value) => {
                let element = Element::from_shared(key.clone(), self.copy_for_write(value));
                let stored = Arc::clone(element.shared_value());
                self.with_store(|store, events| {
                    store.insert(element, events);
                    Ok(())
                })?;
                Ok(Some(self.copy_for_read(&stored)))
            }
            None => Ok(None),
        }
    }

    /// Retrieves the live values among `keys`.
    pub fn get_all(&self, keys: &[K]) -> EngineResult<HashMap<K, Arc<V>>> {
        let found = self.with_store(|store, events| {
            Ok(keys
                .iter()
                .filter_map(|key| store.lookup(key, events).map(|value| (key.clone(), value)))
                .collect::<HashMap<_, _>>())
        })?;

        Ok(found
            .into_iter()
            .map(|(key, value)| {
                let copy = self.copy_for_read(&value);
                (key, copy)
            })
            .collect())
    }

    /// Retrieves many values, batch-loading the misses.
    pub fn get_all_with_loader(&self, keys: &[K]) -> EngineResult<HashMap<K, Arc<V>>> {
        let mut found = self.get_all(keys)?;
        let Some(loader) = self.loader() else {
            return Ok(found);
        };

        let missing: Vec<K> = keys
            .iter()
            .filter(|key| !found.contains_key(*key))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(found);
        }

        let loaded = self.store_loaded(loader.load_all(&missing)?)?;
        for (key, value) in loaded {
            let copy = self.copy_for_read(&value);
            found.insert(key, copy);
        }
        Ok(found)
    }

    /// Loads `keys` through the loader without returning them. Keys already
    /// present are skipped unless `replace_existing` is set. Returns the
    /// number of elements loaded.
    pub fn load_all(&self, keys: &[K], replace_existing: bool) -> EngineResult<usize> {
        self.ensure_alive()?;
        let Some(loader) = self.loader() else {
            return Ok(0);
        };

        let targets: Vec<K> = if replace_existing {
            keys.to_vec()
        } else {
            self.with_store(|store, events| {
                let mut absent = Vec::new();
                for key in keys {
                    if store.peek(key, events).is_none() {
                        absent.push(key.clone());
                    }
                }
                Ok(absent)
            })?
        };
        if targets.is_empty() {
            return Ok(0);
        }

        let loaded = self.store_loaded(loader.load_all(&targets)?)?;
        Ok(loaded.len())
    }

    /// True when a live element exists for `key`. Does not count as access.
    pub fn contains_key(&self, key: &K) -> EngineResult<bool> {
        self.with_store(|store, events| Ok(store.peek(key, events).is_some()))
    }

    /// Snapshot of all keys currently held.
    pub fn keys(&self) -> EngineResult<Vec<K>> {
        self.with_store(|store, events| {
            store.expire_all(events);
            Ok(store.elements.keys().cloned().collect())
        })
    }

    /// Snapshot of all live key/value pairs.
    pub fn entries(&self) -> EngineResult<Vec<(K, Arc<V>)>> {
        let entries = self.with_store(|store, events| {
            store.expire_all(events);
            Ok(store
                .elements
                .values()
                .map(|element| (element.key().clone(), Arc::clone(element.shared_value())))
                .collect::<Vec<_>>())
        })?;

        Ok(entries
            .into_iter()
            .map(|(key, value)| {
                let copy = self.copy_for_read(&value);
                (key, copy)
            })
            .collect())
    }

    // == Write Operations ==
    /// Stores a value, returning the one it replaced. With `with_writer` the
    /// writer runs first and a writer failure leaves the cache untouched.
    pub fn put(&self, key: K, value: V, with_writer: bool) -> EngineResult<Option<Arc<V>>> {
        let writer = self.writer_for(with_writer);
        let element = Element::from_shared(key, self.copy_for_write(value));

        let previous = self.with_store(|store, events| {
            if let Some(writer) = &writer {
                writer.write(&element)?;
            }
            Ok(store.insert(element, events))
        })?;
        Ok(previous.map(|element| self.copy_for_read(element.shared_value())))
    }

    /// Stores many values. On a writer failure only the elements the writer
    /// reported as written are stored, then the failure is returned.
    pub fn put_all(&self, entries: Vec<(K, V)>, with_writer: bool) -> EngineResult<()> {
        let writer = self.writer_for(with_writer);
        let elements: Vec<Element<K, V>> = entries
            .into_iter()
            .map(|(key, value)| Element::from_shared(key, self.copy_for_write(value)))
            .collect();

        self.with_store(|store, events| {
            let Some(writer) = &writer else {
                for element in elements {
                    store.insert(element, events);
                }
                return Ok(());
            };

            let mut pending = elements.clone();
            let result = writer.write_all(&mut pending);
            let pending_keys: HashSet<&K> = pending.iter().map(|element| element.key()).collect();

            for element in elements {
                if result.is_ok() || !pending_keys.contains(element.key()) {
                    store.insert(element, events);
                }
            }
            result
        })
    }

    /// Stores the value only when no live element exists. Returns the
    /// existing value otherwise.
    pub fn put_if_absent(&self, key: K, value: V, with_writer: bool) -> EngineResult<Option<Arc<V>>> {
        let writer = self.writer_for(with_writer);

        let existing = self.with_store(|store, events| {
            if let Some(existing) = store.peek(&key, events) {
                return Ok(Some(existing));
            }
            let element = Element::from_shared(key, self.copy_for_write(value));
            if let Some(writer) = &writer {
                writer.write(&element)?;
            }
            store.insert(element, events);
            Ok(None)
        })?;
        Ok(existing.map(|value| self.copy_for_read(&value)))
    }

    /// Replaces the value only when a live element exists. Returns the value
    /// it replaced.
    pub fn replace(&self, key: K, value: V, with_writer: bool) -> EngineResult<Option<Arc<V>>> {
        let writer = self.writer_for(with_writer);

        let previous = self.with_store(|store, events| {
            if store.peek(&key, events).is_none() {
                return Ok(None);
            }
            let element = Element::from_shared(key, self.copy_for_write(value));
            if let Some(writer) = &writer {
                writer.write(&element)?;
            }
            Ok(store.insert(element, events))
        })?;
        Ok(previous.map(|element| self.copy_for_read(element.shared_value())))
    }

    /// Replaces the value only when the live value equals `expected`.
    pub fn replace_if_equals(&self, key: K, expected: &V, value: V, with_writer: bool) -> EngineResult<bool>
    where
        V: PartialEq,
    {
        let writer = self.writer_for(with_writer);

        self.with_store(|store, events| {
            match store.peek(&key, events) {
                Some(current) if *current == *expected => {}
                _ => return Ok(false),
            }
            let element = Element::from_shared(key, self.copy_for_write(value));
            if let Some(writer) = &writer {
                writer.write(&element)?;
            }
            store.insert(element, events);
            Ok(true)
        })
    }

    /// Removes a key, returning the value it held. With `with_writer` the
    /// writer delete runs first, whether or not the key is present.
    pub fn remove(&self, key: &K, with_writer: bool) -> EngineResult<Option<Arc<V>>> {
        let writer = self.writer_for(with_writer);

        let removed = self.with_store(|store, events| {
            store.expire(key, events);
            if let Some(writer) = &writer {
                let entry = EngineEntry::new(key.clone(), store.elements.get(key).cloned());
                writer.delete(&entry)?;
            }
            Ok(store.remove(key, events))
        })?;
        Ok(removed.map(|element| self.copy_for_read(element.shared_value())))
    }

    /// Removes a key only when its live value equals `expected`.
    pub fn remove_if_equals(&self, key: &K, expected: &V, with_writer: bool) -> EngineResult<bool>
    where
        V: PartialEq,
    {
        let writer = self.writer_for(with_writer);

        self.with_store(|store, events| {
            match store.peek(key, events) {
                Some(current) if *current == *expected => {}
                _ => return Ok(false),
            }
            if let Some(writer) = &writer {
                let entry = EngineEntry::new(key.clone(), store.elements.get(key).cloned());
                writer.delete(&entry)?;
            }
            Ok(store.remove(key, events).is_some())
        })
    }

    /// Removes many keys. On a writer failure only the keys the writer
    /// reported as deleted are removed, then the failure is returned.
    pub fn remove_all(&self, keys: &[K], with_writer: bool) -> EngineResult<()> {
        let writer = self.writer_for(with_writer);

        self.with_store(|store, events| {
            let mut targets = keys.to_vec();
            let mut result = Ok(());

            if let Some(writer) = &writer {
                let mut entries: Vec<EngineEntry<K, V>> = keys
                    .iter()
                    .map(|key| EngineEntry::new(key.clone(), store.elements.get(key).cloned()))
                    .collect();
                result = writer.delete_all(&mut entries);
                if result.is_err() {
                    let pending: HashSet<&K> = entries.iter().map(|entry| entry.key()).collect();
                    targets.retain(|key| !pending.contains(key));
                }
            }

            for key in &targets {
                store.remove(key, events);
            }
            result
        })
    }

    /// Removes every element.
    pub fn remove_all_entries(&self, with_writer: bool) -> EngineResult<()> {
        let keys = self.keys()?;
        self.remove_all(&keys, with_writer)
    }

    // == Maintenance ==
    /// Removes all expired elements, returning how many were removed.
    pub fn evict_expired(&self) -> EngineResult<usize> {
        self.with_store(|store, events| Ok(store.expire_all(events)))
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> EngineStats {
        let store = self.store.lock();
        let mut stats = store.stats.clone();
        stats.set_total_entries(store.elements.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.store.lock().elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().elements.is_empty()
    }

    // == Internals ==
    fn ensure_alive(&self) -> EngineResult<()> {
        if self.status() == EngineStatus::Alive {
            Ok(())
        } else {
            Err(EngineError::NotAlive(self.name().to_string()))
        }
    }

    /// Runs `op` under the store lock, then delivers the events it raised.
    fn with_store<R>(
        &self,
        op: impl FnOnce(&mut Store<K, V>, &mut Events<K, V>) -> EngineResult<R>,
    ) -> EngineResult<R> {
        self.ensure_alive()?;
        let mut events = Vec::new();
        let result = {
            let mut store = self.store.lock();
            op(&mut store, &mut events)
        };
        self.notify(events);
        result
    }

    fn store_loaded(&self, loaded: HashMap<K, V>) -> EngineResult<Vec<(K, Arc<V>)>> {
        let elements: Vec<Element<K, V>> = loaded
            .into_iter()
            .map(|(key, value)| Element::from_shared(key, self.copy_for_write(value)))
            .collect();
        let stored = elements
            .iter()
            .map(|element| (element.key().clone(), Arc::clone(element.shared_value())))
            .collect();

        self.with_store(|store, events| {
            for element in elements {
                store.insert(element, events);
            }
            Ok(())
        })?;
        Ok(stored)
    }

    fn writer_for(&self, with_writer: bool) -> Option<Arc<dyn EngineWriter<K, V>>> {
        if with_writer {
            self.writer()
        } else {
            None
        }
    }

    fn copy_for_write(&self, value: V) -> Arc<V> {
        if self.config.copy_on_write {
            // The caller may still hold handles into the value's interior
            Arc::new(value.clone())
        } else {
            Arc::new(value)
        }
    }

    fn copy_for_read(&self, stored: &Arc<V>) -> Arc<V> {
        if self.config.copy_on_read {
            Arc::new(V::clone(stored))
        } else {
            Arc::clone(stored)
        }
    }

    fn notify(&self, events: Events<K, V>) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        for (event, element) in &events {
            for listener in &listeners {
                if let Err(err) = listener.on_event(*event, element) {
                    warn!(
                        "Listener on cache '{}' failed for {:?} event: {:#}",
                        self.name(),
                        event,
                        err
                    );
                }
            }
        }
    }
}

impl<K, V> fmt::Debug for EngineCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineCache")
            .field("name", &self.config.name)
            .field("status", &*self.status.read())
            .finish_non_exhaustive()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    fn alive_cache(config: CacheConfig) -> EngineCache<String, String> {
        let cache = EngineCache::new(config);
        cache.initialise().unwrap();
        cache
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    /// Writer that records what it writes and refuses configured keys.
    #[derive(Default)]
    struct RecordingWriter {
        written: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
        refuse: HashSet<String>,
    }

    impl EngineWriter<String, String> for RecordingWriter {
        fn write(&self, element: &Element<String, String>) -> EngineResult<()> {
            if self.refuse.contains(element.key()) {
                return Err(EngineError::Writer {
                    pending: 1,
                    source: anyhow::anyhow!("refused {}", element.key()),
                });
            }
            self.written.lock().push(element.key().clone());
            Ok(())
        }

        fn write_all(&self, elements: &mut Vec<Element<String, String>>) -> EngineResult<()> {
            let mut failure = None;
            elements.retain(|element| match self.write(element) {
                Ok(()) => false,
                Err(err) => {
                    failure.get_or_insert(err);
                    true
                }
            });
            failure.map_or(Ok(()), Err)
        }

        fn delete(&self, entry: &EngineEntry<String, String>) -> EngineResult<()> {
            if self.refuse.contains(entry.key()) {
                return Err(EngineError::Writer {
                    pending: 1,
                    source: anyhow::anyhow!("refused {}", entry.key()),
                });
            }
            self.deleted.lock().push(entry.key().clone());
            Ok(())
        }

        fn delete_all(&self, entries: &mut Vec<EngineEntry<String, String>>) -> EngineResult<()> {
            let mut failure = None;
            entries.retain(|entry| match self.delete(entry) {
                Ok(()) => false,
                Err(err) => {
                    failure.get_or_insert(err);
                    true
                }
            });
            failure.map_or(Ok(()), Err)
        }

        fn clone_for(&self, cache_name: &str) -> EngineResult<Box<dyn EngineWriter<String, String>>> {
            Err(EngineError::CloneNotSupported(cache_name.to_string()))
        }
    }

    struct UppercaseLoader;

    impl EngineLoader<String, String> for UppercaseLoader {
        fn load(&self, key: &String) -> EngineResult<Option<String>> {
            if key.starts_with("missing") {
                Ok(None)
            } else {
                Ok(Some(key.to_uppercase()))
            }
        }

        fn load_all(&self, keys: &[String]) -> EngineResult<HashMap<String, String>> {
            let mut loaded = HashMap::new();
            for key in keys {
                if let Some(value) = self.load(key)? {
                    loaded.insert(key.clone(), value);
                }
            }
            Ok(loaded)
        }

        fn clone_for(&self, _cache_name: &str) -> EngineResult<Box<dyn EngineLoader<String, String>>> {
            Ok(Box::new(UppercaseLoader))
        }
    }

    #[derive(Default)]
    struct EventLog {
        events: Mutex<Vec<(EngineEvent, String)>>,
    }

    impl EngineListener<String, String> for EventLog {
        fn on_event(&self, event: EngineEvent, element: &Element<String, String>) -> anyhow::Result<()> {
            self.events.lock().push((event, element.key().clone()));
            Ok(())
        }
    }

    struct FailingListener;

    impl EngineListener<String, String> for FailingListener {
        fn on_event(&self, _event: EngineEvent, _element: &Element<String, String>) -> anyhow::Result<()> {
            anyhow::bail!("listener exploded")
        }
    }

    #[test]
    fn test_requires_initialise() {
        let cache: EngineCache<String, String> = EngineCache::new(CacheConfig::new("c"));
        assert_eq!(cache.status(), EngineStatus::Uninitialised);
        assert!(matches!(cache.get(&key("a")), Err(EngineError::NotAlive(_))));

        cache.initialise().unwrap();
        assert_eq!(cache.status(), EngineStatus::Alive);
        assert!(cache.get(&key("a")).unwrap().is_none());
    }

    #[test]
    fn test_put_and_get() {
        let cache = alive_cache(CacheConfig::new("c"));

        assert!(cache.put(key("k"), key("v1"), false).unwrap().is_none());
        let previous = cache.put(key("k"), key("v2"), false).unwrap();

        assert_eq!(previous.as_deref(), Some(&key("v1")));
        assert_eq!(cache.get(&key("k")).unwrap().as_deref(), Some(&key("v2")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_store_by_reference_shares_value() {
        let cache = alive_cache(CacheConfig::new("c"));
        cache.put(key("k"), key("v"), false).unwrap();

        let first = cache.get(&key("k")).unwrap().unwrap();
        let second = cache.get(&key("k")).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_copy_on_read_returns_fresh_values() {
        let mut config = CacheConfig::new("c");
        config.copy_on_read = true;
        config.copy_on_write = true;
        let cache = alive_cache(config);
        cache.put(key("k"), key("v"), false).unwrap();

        let first = cache.get(&key("k")).unwrap().unwrap();
        let second = cache.get(&key("k")).unwrap().unwrap();
        assert_eq!(first, second);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_lru_eviction() {
        let mut config = CacheConfig::new("c");
        config.max_entries_local_heap = 3;
        let cache = alive_cache(config);
        let log = Arc::new(EventLog::default());
        cache.register_listener(log.clone());

        for k in ["key1", "key2", "key3"] {
            cache.put(key(k), key("v"), false).unwrap();
        }
        // Access key1 to make it most recently used
        cache.get(&key("key1")).unwrap();
        cache.put(key("key4"), key("v"), false).unwrap();

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains_key(&key("key2")).unwrap());
        assert!(cache.contains_key(&key("key1")).unwrap());
        assert_eq!(cache.stats().evictions, 1);
        assert!(log
            .events
            .lock()
            .contains(&(EngineEvent::Evicted, key("key2"))));
    }

    #[test]
    fn test_ttl_expiration() {
        let mut config = CacheConfig::new("c");
        config.time_to_live_seconds = 1;
        let cache = alive_cache(config);

        cache.put(key("k"), key("v"), false).unwrap();
        assert!(cache.get(&key("k")).unwrap().is_some());

        sleep(Duration::from_millis(1100));

        assert!(cache.get(&key("k")).unwrap().is_none());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_evict_expired() {
        let mut config = CacheConfig::new("c");
        config.time_to_idle_seconds = 1;
        let cache = alive_cache(config);

        cache.put(key("a"), key("v"), false).unwrap();
        cache.put(key("b"), key("v"), false).unwrap();
        sleep(Duration::from_millis(1100));

        assert_eq!(cache.evict_expired().unwrap(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_write_through_failure_keeps_entry_absent() {
        let cache = alive_cache(CacheConfig::new("c"));
        let writer = Arc::new(RecordingWriter {
            refuse: [key("bad")].into_iter().collect(),
            ..Default::default()
        });
        cache.register_writer(writer.clone());

        cache.put(key("good"), key("v"), true).unwrap();
        let result = cache.put(key("bad"), key("v"), true);

        assert!(matches!(result, Err(EngineError::Writer { .. })));
        assert!(cache.contains_key(&key("good")).unwrap());
        assert!(!cache.contains_key(&key("bad")).unwrap());
        assert_eq!(*writer.written.lock(), vec![key("good")]);
    }

    #[test]
    fn test_put_all_stores_only_written_elements() {
        let cache = alive_cache(CacheConfig::new("c"));
        cache.register_writer(Arc::new(RecordingWriter {
            refuse: [key("b")].into_iter().collect(),
            ..Default::default()
        }));

        let entries = vec![(key("a"), key("1")), (key("b"), key("2")), (key("c"), key("3"))];
        let result = cache.put_all(entries, true);

        assert!(matches!(result, Err(EngineError::Writer { .. })));
        assert!(cache.contains_key(&key("a")).unwrap());
        assert!(!cache.contains_key(&key("b")).unwrap());
        assert!(cache.contains_key(&key("c")).unwrap());
    }

    #[test]
    fn test_remove_all_keeps_undeleted_keys() {
        let cache = alive_cache(CacheConfig::new("c"));
        cache.register_writer(Arc::new(RecordingWriter {
            refuse: [key("b")].into_iter().collect(),
            ..Default::default()
        }));
        for k in ["a", "b", "c"] {
            cache.put(key(k), key("v"), false).unwrap();
        }

        let result = cache.remove_all(&[key("a"), key("b"), key("c")], true);

        assert!(result.is_err());
        assert_eq!(cache.keys().unwrap(), vec![key("b")]);
    }

    #[test]
    fn test_get_with_loader() {
        let cache = alive_cache(CacheConfig::new("c"));
        cache.register_loader(Arc::new(UppercaseLoader));

        assert_eq!(
            cache.get_with_loader(&key("abc")).unwrap().as_deref(),
            Some(&key("ABC"))
        );
        assert!(cache.contains_key(&key("abc")).unwrap());
        assert!(cache.get_with_loader(&key("missing")).unwrap().is_none());
        // Plain get never consults the loader
        assert!(cache.get(&key("other")).unwrap().is_none());
    }

    #[test]
    fn test_get_all_with_loader_and_load_all() {
        let cache = alive_cache(CacheConfig::new("c"));
        cache.register_loader(Arc::new(UppercaseLoader));
        cache.put(key("a"), key("cached"), false).unwrap();

        let found = cache
            .get_all_with_loader(&[key("a"), key("b"), key("missing-c")])
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&key("a")].as_str(), "cached");
        assert_eq!(found[&key("b")].as_str(), "B");

        assert_eq!(cache.load_all(&[key("a"), key("d")], false).unwrap(), 1);
        assert_eq!(cache.load_all(&[key("a")], true).unwrap(), 1);
        assert_eq!(cache.get(&key("a")).unwrap().as_deref(), Some(&key("A")));
    }

    #[test]
    fn test_conditional_operations() {
        let cache = alive_cache(CacheConfig::new("c"));

        assert!(cache.replace(key("k"), key("v"), false).unwrap().is_none());
        assert!(!cache.contains_key(&key("k")).unwrap());

        assert!(cache.put_if_absent(key("k"), key("v1"), false).unwrap().is_none());
        assert_eq!(
            cache.put_if_absent(key("k"), key("v2"), false).unwrap().as_deref(),
            Some(&key("v1"))
        );

        assert!(!cache.replace_if_equals(key("k"), &key("nope"), key("v3"), false).unwrap());
        assert!(cache.replace_if_equals(key("k"), &key("v1"), key("v3"), false).unwrap());
        assert!(!cache.remove_if_equals(&key("k"), &key("v1"), false).unwrap());
        assert!(cache.remove_if_equals(&key("k"), &key("v3"), false).unwrap());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_listener_events_and_failures() {
        let cache = alive_cache(CacheConfig::new("c"));
        let log = Arc::new(EventLog::default());
        cache.register_listener(Arc::new(FailingListener));
        cache.register_listener(log.clone());

        cache.put(key("k"), key("v1"), false).unwrap();
        cache.put(key("k"), key("v2"), false).unwrap();
        cache.remove(&key("k"), false).unwrap();

        // A failing listener neither blocks the others nor the operation
        assert_eq!(
            *log.events.lock(),
            vec![
                (EngineEvent::Put, key("k")),
                (EngineEvent::Updated, key("k")),
                (EngineEvent::Removed, key("k")),
            ]
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn test_dispose() {
        let cache = alive_cache(CacheConfig::new("c"));
        cache.put(key("k"), key("v"), false).unwrap();

        cache.dispose();
        cache.dispose();

        assert_eq!(cache.status(), EngineStatus::Shutdown);
        assert!(matches!(cache.put(key("k"), key("v"), false), Err(EngineError::NotAlive(_))));
        assert!(matches!(cache.initialise(), Err(EngineError::NotAlive(_))));
    }

    #[test]
    fn test_derive_clones_extensions() {
        let cache = alive_cache(CacheConfig::new("template"));
        cache.register_loader(Arc::new(UppercaseLoader));

        let derived = cache.derive("copy").unwrap();
        assert_eq!(derived.name(), "copy");
        assert!(derived.loader().is_some());
        assert_eq!(derived.status(), EngineStatus::Uninitialised);

        cache.register_writer(Arc::new(RecordingWriter::default()));
        assert!(matches!(
            cache.derive("copy2"),
            Err(EngineError::CloneNotSupported(_))
        ));
    }

    #[test]
    fn test_stats() {
        let cache = alive_cache(CacheConfig::new("c"));

        cache.put(key("k"), key("v"), false).unwrap();
        cache.get(&key("k")).unwrap();
        cache.get(&key("nonexistent")).unwrap();
        cache.remove(&key("k"), false).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.puts, 1);
        assert_eq!(stats.removals, 1);
        assert_eq!(stats.total_entries, 0);
    }
}
