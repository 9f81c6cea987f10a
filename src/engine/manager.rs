//! Engine Manager Module
//!
//! Named container of engine caches, registered in a process-wide table so
//! that a manager can be found again by name.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, ManagerConfig};
use crate::engine::{CacheKey, CacheValue, EngineCache, EngineStatus};
use crate::error::{EngineError, EngineResult};

/// Alive managers by name. Attach counts only change under this lock.
static MANAGERS: Lazy<Mutex<HashMap<String, Arc<EngineManager>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

// == Managed Cache ==
/// Type-erased view of an engine cache held by a manager.
pub trait ManagedCache: Send + Sync {
    fn name(&self) -> &str;

    fn status(&self) -> EngineStatus;

    fn dispose(&self);

    /// Removes expired elements, returning how many were removed.
    fn evict_expired(&self) -> usize;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<K: CacheKey, V: CacheValue> ManagedCache for EngineCache<K, V> {
    fn name(&self) -> &str {
        EngineCache::name(self)
    }

    fn status(&self) -> EngineStatus {
        EngineCache::status(self)
    }

    fn dispose(&self) {
        EngineCache::dispose(self)
    }

    fn evict_expired(&self) -> usize {
        EngineCache::evict_expired(self).unwrap_or(0)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Caches held by a manager: instantiated ones plus declared ones not yet
/// requested with concrete key/value types.
#[derive(Default)]
struct Registry {
    caches: HashMap<String, Arc<dyn ManagedCache>>,
    declared: HashMap<String, CacheConfig>,
}

impl Registry {
    fn is_live(&self, name: &str) -> bool {
        self.caches
            .get(name)
            .map(|cache| cache.status() != EngineStatus::Shutdown)
            .unwrap_or(false)
    }

    fn purge_disposed(&mut self, name: &str) -> bool {
        let disposed = self
            .caches
            .get(name)
            .map(|cache| cache.status() == EngineStatus::Shutdown)
            .unwrap_or(false);
        if disposed {
            self.caches.remove(name);
            debug!("Disposed cache '{}' dropped from registry", name);
        }
        disposed
    }
}

// == Engine Manager ==
pub struct EngineManager {
    name: String,
    config: ManagerConfig,
    status: RwLock<EngineStatus>,
    registry: Mutex<Registry>,
    /// Façades currently attached.
    attached: AtomicUsize,
}

impl EngineManager {
    // == Constructor ==
    /// Returns the alive manager registered under the configuration's name,
    /// or creates and registers a new one.
    ///
    /// An alive manager is shared with a caller asking for the same
    /// configuration or for a bare `ManagerConfig::named` one. Any other
    /// configuration is refused, since it could not be applied.
    pub fn new_instance(config: ManagerConfig) -> EngineResult<Arc<Self>> {
        config.validate()?;
        let mut managers = MANAGERS.lock();
        Self::instance(&mut managers, config)
    }

    /// Like `new_instance`, and records one more façade holding the manager.
    pub fn attach(config: ManagerConfig) -> EngineResult<Arc<Self>> {
        config.validate()?;
        let mut managers = MANAGERS.lock();
        let manager = Self::instance(&mut managers, config)?;
        manager.attached.fetch_add(1, Ordering::Relaxed);
        Ok(manager)
    }

    /// Releases one façade hold. The last one out shuts the manager down.
    /// Returns whether this call shut it down.
    pub fn detach(&self) -> bool {
        {
            let mut managers = MANAGERS.lock();
            let remaining = self.attached.load(Ordering::Relaxed).saturating_sub(1);
            self.attached.store(remaining, Ordering::Relaxed);
            if remaining > 0 {
                debug!(
                    "Engine manager '{}' still held by {} façade(s)",
                    self.name, remaining
                );
                return false;
            }
            // Nobody can attach to it from here on
            self.unregister(&mut managers);
        }
        self.shutdown();
        true
    }

    fn instance(
        managers: &mut HashMap<String, Arc<EngineManager>>,
        config: ManagerConfig,
    ) -> EngineResult<Arc<Self>> {
        if let Some(existing) = managers.get(&config.name) {
            if existing.status() == EngineStatus::Alive {
                if existing.config != config && config != ManagerConfig::named(&config.name) {
                    warn!(
                        "Engine manager '{}' is already running with another configuration",
                        config.name
                    );
                    return Err(EngineError::Config(format!(
                        "manager '{}' is already running with a different configuration",
                        config.name
                    )));
                }
                debug!("Reusing engine manager '{}'", config.name);
                return Ok(Arc::clone(existing));
            }
        }

        let declared = config
            .caches
            .iter()
            .map(|cache| (cache.name.clone(), cache.clone()))
            .collect();
        let manager = Arc::new(Self {
            name: config.name.clone(),
            config,
            status: RwLock::new(EngineStatus::Alive),
            registry: Mutex::new(Registry {
                caches: HashMap::new(),
                declared,
            }),
            attached: AtomicUsize::new(0),
        });
        managers.insert(manager.name.clone(), Arc::clone(&manager));

        info!(
            "Engine manager '{}' started with {} declared cache(s)",
            manager.name,
            manager.config.caches.len()
        );
        Ok(manager)
    }

    /// Looks up an alive manager by name.
    pub fn get_named(name: &str) -> Option<Arc<Self>> {
        MANAGERS.lock().get(name).cloned()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.read()
    }

    /// Number of façades attached.
    pub fn attached(&self) -> usize {
        self.attached.load(Ordering::Relaxed)
    }

    /// Configuration for a cache created without a declaration.
    pub fn default_cache_config(&self, cache_name: &str) -> CacheConfig {
        let mut config = self.config.default_cache.clone();
        config.name = cache_name.to_string();
        config
    }

    // == Add Cache ==
    /// Initialises `cache` and registers it. Fails if the name is taken by
    /// an instantiated or declared cache. A disposed cache no longer holds
    /// its name.
    pub fn add_cache<K: CacheKey, V: CacheValue>(
        &self,
        cache: EngineCache<K, V>,
    ) -> EngineResult<Arc<EngineCache<K, V>>> {
        self.ensure_alive()?;
        let mut registry = self.registry.lock();

        let name = cache.name().to_string();
        registry.purge_disposed(&name);
        if registry.caches.contains_key(&name) || registry.declared.contains_key(&name) {
            return Err(EngineError::CacheExists(name));
        }

        cache.initialise()?;
        let cache = Arc::new(cache);
        registry
            .caches
            .insert(name.clone(), Arc::clone(&cache) as Arc<dyn ManagedCache>);

        info!("Cache '{}' added to manager '{}'", name, self.name);
        Ok(cache)
    }

    // == Get Cache ==
    /// Typed lookup. A declared cache is instantiated with `K`/`V` on its
    /// first lookup; later lookups must use the same types.
    pub fn cache<K: CacheKey, V: CacheValue>(
        &self,
        name: &str,
    ) -> EngineResult<Option<Arc<EngineCache<K, V>>>> {
        self.ensure_alive()?;
        let mut registry = self.registry.lock();
        registry.purge_disposed(name);

        if let Some(existing) = registry.caches.get(name) {
            return downcast(name, Arc::clone(existing)).map(Some);
        }
        let Some(config) = registry.declared.remove(name) else {
            return Ok(None);
        };

        let cache = EngineCache::new(config);
        cache.initialise()?;
        let cache = Arc::new(cache);
        registry
            .caches
            .insert(name.to_string(), Arc::clone(&cache) as Arc<dyn ManagedCache>);

        debug!("Declared cache '{}' instantiated in manager '{}'", name, self.name);
        Ok(Some(cache))
    }

    /// True when a live cache is instantiated or declared under `name`.
    pub fn cache_exists(&self, name: &str) -> bool {
        let registry = self.registry.lock();
        registry.is_live(name) || registry.declared.contains_key(name)
    }

    /// Names of all live instantiated and declared caches, sorted.
    pub fn cache_names(&self) -> Vec<String> {
        let registry = self.registry.lock();
        let mut names: Vec<String> = registry
            .caches
            .iter()
            .filter(|(_, cache)| cache.status() != EngineStatus::Shutdown)
            .map(|(name, _)| name)
            .chain(registry.declared.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }

    // == Remove Cache ==
    /// Disposes and forgets a cache. Returns whether anything was removed.
    pub fn remove_cache(&self, name: &str) -> bool {
        let mut registry = self.registry.lock();
        let instantiated = registry
            .caches
            .remove(name)
            .filter(|cache| cache.status() != EngineStatus::Shutdown);
        let declared = registry.declared.remove(name);

        if let Some(cache) = &instantiated {
            cache.dispose();
        }
        let removed = instantiated.is_some() || declared.is_some();
        if removed {
            info!("Cache '{}' removed from manager '{}'", name, self.name);
        }
        removed
    }

    /// Forgets the cache under `name` if it has been disposed on its own.
    /// Returns whether an entry was dropped.
    pub fn purge_disposed(&self, name: &str) -> bool {
        self.registry.lock().purge_disposed(name)
    }

    // == Evict Expired ==
    /// Sweeps expired elements out of every alive cache.
    pub fn evict_expired(&self) -> usize {
        let caches: Vec<Arc<dyn ManagedCache>> =
            self.registry.lock().caches.values().cloned().collect();

        caches
            .iter()
            .filter(|cache| cache.status() == EngineStatus::Alive)
            .map(|cache| cache.evict_expired())
            .sum()
    }

    // == Shutdown ==
    /// Disposes every cache and unregisters the manager. Shutting down twice
    /// is a no-op.
    pub fn shutdown(&self) {
        {
            let mut status = self.status.write();
            if *status == EngineStatus::Shutdown {
                return;
            }
            *status = EngineStatus::Shutdown;
        }

        let caches: Vec<Arc<dyn ManagedCache>> = {
            let mut registry = self.registry.lock();
            registry.declared.clear();
            registry.caches.drain().map(|(_, cache)| cache).collect()
        };
        for cache in &caches {
            cache.dispose();
        }
        self.unregister(&mut MANAGERS.lock());

        info!(
            "Engine manager '{}' shut down, {} cache(s) disposed",
            self.name,
            caches.len()
        );
    }

    /// Drops the name table entry if it still points at this manager.
    fn unregister(&self, managers: &mut HashMap<String, Arc<EngineManager>>) {
        let registered_here = managers
            .get(&self.name)
            .map(|manager| std::ptr::eq(manager.as_ref(), self))
            .unwrap_or(false);
        if registered_here {
            managers.remove(&self.name);
        }
    }

    fn ensure_alive(&self) -> EngineResult<()> {
        if self.status() == EngineStatus::Alive {
            Ok(())
        } else {
            Err(EngineError::ManagerShutdown(self.name.clone()))
        }
    }
}

impl fmt::Debug for EngineManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineManager")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn downcast<K: CacheKey, V: CacheValue>(
    name: &str,
    cache: Arc<dyn ManagedCache>,
) -> EngineResult<Arc<EngineCache<K, V>>> {
    cache
        .into_any()
        .downcast::<EngineCache<K, V>>()
        .map_err(|_| EngineError::TypeMismatch {
            name: name.to_string(),
        })
}
