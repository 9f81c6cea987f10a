//! Manager Façade
//!
//! Name-scoped registry of cache façades owning one engine manager. Façade
//! registration and engine registration happen under the same lock.

use std::any::{type_name, Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::api::{OptionalFeature, Status};
use crate::bridge::{adapt_status, BridgeCache, BridgeCacheBuilder, BridgeConfiguration};
use crate::caching::{self, Scope, DEFAULT_CACHE_MANAGER_NAME};
use crate::config::ManagerConfig;
use crate::engine::{CacheKey, CacheValue, EngineCache, EngineManager, EngineStatus};
use crate::error::{CacheError, EngineError, Result};

// == Registered Cache ==
/// Type-erased view of a façade held in the registry.
trait RegisteredCache: Send + Sync {
    fn is_live(&self) -> bool;

    /// Stops the façade without touching its engine cache.
    fn close(&self);

    /// Stops the façade and disposes its engine cache.
    fn release(&self);

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<K: CacheKey, V: CacheValue> RegisteredCache for BridgeCache<K, V> {
    fn is_live(&self) -> bool {
        self.status() == Status::Started
    }

    fn close(&self) {
        self.mark_stopped();
    }

    fn release(&self) {
        self.mark_stopped();
        self.engine().dispose();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn downcast<K: CacheKey, V: CacheValue>(
    name: &str,
    cache: Arc<dyn RegisteredCache>,
) -> Result<Arc<BridgeCache<K, V>>> {
    cache
        .into_any()
        .downcast::<BridgeCache<K, V>>()
        .map_err(|_| {
            EngineError::TypeMismatch {
                name: name.to_string(),
            }
            .into()
        })
}

// == Bridge Manager ==
/// Several managers of the same name, one per scope, share one engine
/// manager. Each keeps its own registry and lifecycle; the engine manager is
/// shut down when the last of them shuts down.
pub struct BridgeManager {
    scope: Scope,
    status: RwLock<Status>,
    engine: Arc<EngineManager>,
    caches: Mutex<HashMap<String, Arc<dyn RegisteredCache>>>,
    immutable_types: Mutex<HashSet<TypeId>>,
    self_ref: Weak<BridgeManager>,
}

impl BridgeManager {
    // == Constructor ==
    /// Creates a started manager. A non-default name is configured from the
    /// scope's `engine-<name>.json` resource when one exists.
    pub fn new(name: &str, scope: Scope) -> Result<Arc<Self>> {
        if name.is_empty() {
            return Err(CacheError::IllegalArgument(
                "cache manager name must not be empty".to_string(),
            ));
        }

        let engine = EngineManager::attach(engine_config(name, &scope)?)?;
        info!("Cache manager '{}' started in scope {}", name, scope.id());

        Ok(Arc::new_cyclic(|self_ref| Self {
            scope,
            status: RwLock::new(Status::Started),
            engine,
            caches: Mutex::new(HashMap::new()),
            immutable_types: Mutex::new(HashSet::new()),
            self_ref: self_ref.clone(),
        }))
    }

    pub fn name(&self) -> &str {
        self.engine.name()
    }

    /// Stopped after `shutdown`, or once the engine manager has been shut
    /// down underneath this façade.
    pub fn status(&self) -> Status {
        let status = *self.status.read();
        if status == Status::Started && self.engine.status() != EngineStatus::Alive {
            return adapt_status(self.engine.status());
        }
        status
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The engine manager backing this façade.
    pub fn engine_manager(&self) -> &Arc<EngineManager> {
        &self.engine
    }

    // == Cache Creation ==
    pub fn create_cache_builder<K: CacheKey, V: CacheValue>(
        &self,
        cache_name: &str,
    ) -> Result<BridgeCacheBuilder<K, V>> {
        self.ensure_started()?;
        ensure_cache_name(cache_name)?;
        let manager = self.self_ref.upgrade().ok_or_else(|| {
            CacheError::IllegalState(format!("Cache manager '{}' is gone", self.name()))
        })?;
        Ok(BridgeCacheBuilder::new(cache_name, manager))
    }

    /// Adds `cache` to the engine and registers the façade `wrap` builds
    /// around it, atomically with respect to other registry changes.
    pub(crate) fn register<K: CacheKey, V: CacheValue>(
        &self,
        cache: EngineCache<K, V>,
        wrap: impl FnOnce(Weak<BridgeManager>, Arc<EngineCache<K, V>>) -> BridgeCache<K, V>,
    ) -> Result<Arc<BridgeCache<K, V>>> {
        let mut caches = self.caches.lock();
        self.ensure_started()?;

        let engine = self.engine.add_cache(cache)?;
        let facade = Arc::new(wrap(self.self_ref.clone(), engine));
        caches.insert(
            facade.name().to_string(),
            Arc::clone(&facade) as Arc<dyn RegisteredCache>,
        );
        Ok(facade)
    }

    // == Cache Lookup ==
    /// Returns the cache registered under `cache_name`. An engine cache not
    /// yet seen by this façade is wrapped once and remembered.
    pub fn get_cache<K: CacheKey, V: CacheValue>(
        &self,
        cache_name: &str,
    ) -> Result<Option<Arc<BridgeCache<K, V>>>> {
        self.ensure_started()?;
        ensure_cache_name(cache_name)?;
        let mut caches = self.caches.lock();

        if let Some(existing) = caches.get(cache_name) {
            if existing.is_live() {
                return downcast(cache_name, Arc::clone(existing)).map(Some);
            }
            // Stopped through another façade or removed from the engine
            caches.remove(cache_name);
            debug!("Stopped cache '{}' dropped from manager '{}'", cache_name, self.name());
        }
        let Some(engine) = self.engine.cache::<K, V>(cache_name)? else {
            return Ok(None);
        };

        let configuration = BridgeConfiguration::from_engine(engine.config());
        let facade = Arc::new(BridgeCache::new(
            self.self_ref.clone(),
            engine,
            configuration,
            None,
            None,
            Vec::new(),
        ));
        caches.insert(
            cache_name.to_string(),
            Arc::clone(&facade) as Arc<dyn RegisteredCache>,
        );

        debug!("Cache '{}' bound to manager '{}'", cache_name, self.name());
        Ok(Some(facade))
    }

    /// Snapshot of the registered caches with key type `K` and value type `V`,
    /// sorted by name.
    pub fn get_caches<K: CacheKey, V: CacheValue>(&self) -> Result<Vec<Arc<BridgeCache<K, V>>>> {
        self.ensure_started()?;
        let mut caches = self.caches.lock();
        caches.retain(|_, cache| cache.is_live());
        let mut found: Vec<Arc<BridgeCache<K, V>>> = caches
            .iter()
            .filter_map(|(name, cache)| downcast(name, Arc::clone(cache)).ok())
            .collect();
        found.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(found)
    }

    /// Names of every cache the engine manager knows, including declared
    /// caches that have not been looked up yet.
    pub fn cache_names(&self) -> Result<Vec<String>> {
        self.ensure_started()?;
        Ok(self.engine.cache_names())
    }

    // == Cache Removal ==
    /// Stops and forgets a cache. Returns whether anything was removed.
    pub fn remove_cache(&self, cache_name: &str) -> Result<bool> {
        self.ensure_started()?;
        ensure_cache_name(cache_name)?;

        let mut caches = self.caches.lock();
        let facade = caches
            .remove(cache_name)
            .filter(|facade| facade.is_live());
        if let Some(facade) = &facade {
            facade.release();
        }
        let engine_removed = self.engine.remove_cache(cache_name);
        Ok(facade.is_some() || engine_removed)
    }

    /// Drops a cache stopped on its own from both registries.
    pub(crate) fn forget(&self, cache_name: &str) {
        let mut caches = self.caches.lock();
        let stopped = caches
            .get(cache_name)
            .map(|facade| !facade.is_live())
            .unwrap_or(false);
        if stopped {
            caches.remove(cache_name);
        }
        self.engine.purge_disposed(cache_name);
    }

    // == Immutable Types ==
    /// Declares `T` safe to share without copying. Only caches built after
    /// the call are affected.
    pub fn add_immutable_type<T: Any>(&self) -> Result<()> {
        self.ensure_started()?;
        self.immutable_types.lock().insert(TypeId::of::<T>());
        debug!(
            "Type {} declared immutable in manager '{}'",
            type_name::<T>(),
            self.name()
        );
        Ok(())
    }

    pub fn is_immutable<T: Any>(&self) -> bool {
        self.immutable_types.lock().contains(&TypeId::of::<T>())
    }

    // == Lifecycle ==
    /// Stops every cache of this manager and detaches from the engine
    /// manager, which shuts down once no other manager holds it.
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut status = self.status.write();
            if *status != Status::Started {
                return Err(CacheError::IllegalState(format!(
                    "Cache manager '{}' is {}",
                    self.name(),
                    *status
                )));
            }
            *status = Status::Stopped;
        }

        let stopped = {
            let mut caches = self.caches.lock();
            let stopped = caches.len();
            for (_, cache) in caches.drain() {
                cache.close();
            }
            stopped
        };
        self.immutable_types.lock().clear();
        let engine_shut_down = self.engine.detach();

        info!(
            "Cache manager '{}' shut down, {} cache(s) stopped, engine {}",
            self.name(),
            stopped,
            if engine_shut_down { "shut down" } else { "still in use" }
        );
        Ok(())
    }

    // == Features ==
    pub fn is_supported(&self, feature: OptionalFeature) -> Result<bool> {
        self.ensure_started()?;
        Ok(caching::is_supported(feature))
    }

    /// Transactions are not available on this engine.
    pub fn user_transaction(&self) -> Result<Infallible> {
        self.ensure_started()?;
        Err(CacheError::Unsupported(
            "user transactions are not supported".to_string(),
        ))
    }

    /// Returns this manager as `T`.
    pub fn unwrap<T: Any + Send + Sync>(self: &Arc<Self>) -> Result<Arc<T>> {
        let this = Arc::clone(self) as Arc<dyn Any + Send + Sync>;
        this.downcast::<T>().map_err(|_| {
            CacheError::IllegalArgument(format!(
                "Cache manager '{}' cannot be unwrapped to {}",
                self.name(),
                type_name::<T>()
            ))
        })
    }

    pub(crate) fn ensure_started(&self) -> Result<()> {
        match self.status() {
            Status::Started => Ok(()),
            status => Err(CacheError::IllegalState(format!(
                "Cache manager '{}' is {}",
                self.name(),
                status
            ))),
        }
    }
}

impl Drop for BridgeManager {
    fn drop(&mut self) {
        if *self.status.get_mut() == Status::Started {
            self.engine.detach();
        }
    }
}

impl fmt::Debug for BridgeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeManager")
            .field("name", &self.name())
            .field("scope", &self.scope)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn ensure_cache_name(name: &str) -> Result<()> {
    if name.is_empty() {
        Err(CacheError::IllegalArgument(
            "cache name must not be empty".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Engine configuration for the named manager.
fn engine_config(name: &str, scope: &Scope) -> Result<ManagerConfig> {
    if name == DEFAULT_CACHE_MANAGER_NAME {
        return Ok(ManagerConfig::named(name));
    }

    let resource = ManagerConfig::resource_name(name);
    match scope.find_resource(&resource) {
        Some(path) => {
            info!("Configuring cache manager '{}' from {}", name, path.display());
            let mut config = ManagerConfig::from_file(&path)?;
            config.name = name.to_string();
            Ok(config)
        }
        None => {
            debug!("No {} resource found, using defaults", resource);
            Ok(ManagerConfig::named(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Expiry, ExpiryType, TimeUnit};

    fn manager(name: &str) -> Arc<BridgeManager> {
        BridgeManager::new(name, Scope::new()).unwrap()
    }

    #[test]
    fn test_name_matches_engine_manager() {
        let manager = manager("bridge-test-name");
        assert_eq!(manager.name(), manager.engine_manager().name());
        assert_eq!(manager.status(), Status::Started);
        manager.shutdown().unwrap();
    }

    #[test]
    fn test_empty_names_rejected() {
        assert!(matches!(
            BridgeManager::new("", Scope::new()),
            Err(CacheError::IllegalArgument(_))
        ));

        let manager = manager("bridge-test-empty");
        assert!(matches!(
            manager.get_cache::<String, String>(""),
            Err(CacheError::IllegalArgument(_))
        ));
        assert!(matches!(manager.remove_cache(""), Err(CacheError::IllegalArgument(_))));
        manager.shutdown().unwrap();
    }

    #[test]
    fn test_built_cache_is_registered() {
        let manager = manager("bridge-test-registered");
        let cache = manager
            .create_cache_builder::<String, u32>("c")
            .unwrap()
            .build()
            .unwrap();

        let found = manager.get_cache::<String, u32>("c").unwrap().unwrap();
        assert!(Arc::ptr_eq(&cache, &found));

        let all = manager.get_caches::<String, u32>().unwrap();
        assert_eq!(all.len(), 1);
        assert!(Arc::ptr_eq(&all[0], &cache));
        assert!(manager.get_caches::<String, String>().unwrap().is_empty());

        assert_eq!(manager.cache_names().unwrap(), vec!["c".to_string()]);
        assert!(matches!(
            manager.get_cache::<u32, u32>("c"),
            Err(CacheError::Engine(EngineError::TypeMismatch { .. }))
        ));
        manager.shutdown().unwrap();
    }

    #[test]
    fn test_duplicate_build_rejected() {
        let manager = manager("bridge-test-duplicate");
        manager
            .create_cache_builder::<String, u32>("c")
            .unwrap()
            .build()
            .unwrap();

        let again = manager.create_cache_builder::<String, u32>("c").unwrap().build();
        assert!(matches!(
            again,
            Err(CacheError::Engine(EngineError::CacheExists(_)))
        ));
        manager.shutdown().unwrap();
    }

    #[test]
    fn test_remove_cache_twice() {
        let manager = manager("bridge-test-remove");
        let cache = manager
            .create_cache_builder::<String, u32>("c")
            .unwrap()
            .build()
            .unwrap();

        assert!(manager.remove_cache("c").unwrap());
        assert!(!manager.remove_cache("c").unwrap());
        assert_eq!(cache.status(), Status::Stopped);
        assert!(manager.get_cache::<String, u32>("c").unwrap().is_none());
        assert!(manager.cache_names().unwrap().is_empty());
        manager.shutdown().unwrap();
    }

    #[test]
    fn test_stopped_cache_frees_its_name() {
        let manager = manager("bridge-test-stop");
        let cache = manager
            .create_cache_builder::<String, u32>("c")
            .unwrap()
            .build()
            .unwrap();
        cache.put("k".to_string(), 1).unwrap();

        cache.stop().unwrap();

        assert!(manager.get_cache::<String, u32>("c").unwrap().is_none());
        assert!(manager.get_caches::<String, u32>().unwrap().is_empty());
        assert!(manager.cache_names().unwrap().is_empty());
        assert!(!manager.remove_cache("c").unwrap());

        let rebuilt = manager
            .create_cache_builder::<String, u32>("c")
            .unwrap()
            .build()
            .unwrap();
        assert!(!Arc::ptr_eq(&cache, &rebuilt));
        assert_eq!(rebuilt.status(), Status::Started);
        assert_eq!(cache.status(), Status::Stopped);
        assert!(rebuilt.get(&"k".to_string()).unwrap().is_none());
        manager.shutdown().unwrap();
    }

    #[test]
    fn test_removal_in_one_scope_is_seen_in_another() {
        let first = manager("bridge-test-peer-remove");
        let second = manager("bridge-test-peer-remove");
        assert!(Arc::ptr_eq(first.engine_manager(), second.engine_manager()));

        let built = first
            .create_cache_builder::<String, u32>("x")
            .unwrap()
            .build()
            .unwrap();
        let wrapped = second.get_cache::<String, u32>("x").unwrap().unwrap();
        assert!(Arc::ptr_eq(built.engine(), wrapped.engine()));

        assert!(second.remove_cache("x").unwrap());

        assert_eq!(built.status(), Status::Stopped);
        assert!(first.get_cache::<String, u32>("x").unwrap().is_none());
        assert!(first.get_caches::<String, u32>().unwrap().is_empty());
        assert!(first.cache_names().unwrap().is_empty());
        assert!(!first.remove_cache("x").unwrap());

        // Stopping through the other scope frees the name as well
        let rebuilt = first
            .create_cache_builder::<String, u32>("x")
            .unwrap()
            .build()
            .unwrap();
        second.get_cache::<String, u32>("x").unwrap().unwrap().stop().unwrap();
        assert_eq!(rebuilt.status(), Status::Stopped);
        assert!(first.get_cache::<String, u32>("x").unwrap().is_none());

        first.shutdown().unwrap();
        second.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_in_one_scope_leaves_the_other_running() {
        let first = manager("bridge-test-peer-shutdown");
        let second = manager("bridge-test-peer-shutdown");
        first.add_immutable_type::<u32>().unwrap();
        let cache = first
            .create_cache_builder::<String, u32>("x")
            .unwrap()
            .build()
            .unwrap();
        let wrapped = second.get_cache::<String, u32>("x").unwrap().unwrap();

        second.shutdown().unwrap();

        assert_eq!(second.status(), Status::Stopped);
        assert_eq!(wrapped.status(), Status::Stopped);
        assert_eq!(first.status(), Status::Started);
        assert!(first.is_immutable::<u32>());
        assert_eq!(cache.status(), Status::Started);
        cache.put("k".to_string(), 1).unwrap();
        assert_eq!(first.cache_names().unwrap(), vec!["x".to_string()]);

        first.shutdown().unwrap();

        assert_eq!(cache.status(), Status::Stopped);
        assert!(!first.is_immutable::<u32>());
        assert_eq!(first.engine_manager().status(), EngineStatus::Shutdown);
        assert!(EngineManager::get_named("bridge-test-peer-shutdown").is_none());
    }

    #[test]
    fn test_engine_shut_down_underneath() {
        let manager = manager("bridge-test-underneath");
        manager.engine_manager().shutdown();

        assert_eq!(manager.status(), Status::Stopped);
        assert!(matches!(
            manager.get_cache::<String, u32>("c"),
            Err(CacheError::IllegalState(_))
        ));
    }

    #[test]
    fn test_shutdown_rejects_operations() {
        let manager = manager("bridge-test-shutdown");
        let cache = manager
            .create_cache_builder::<String, u32>("c")
            .unwrap()
            .set_expiry(ExpiryType::Modified, Expiry::new(TimeUnit::Minutes, 1))
            .build()
            .unwrap();
        manager.add_immutable_type::<u32>().unwrap();

        manager.shutdown().unwrap();

        assert_eq!(manager.status(), Status::Stopped);
        assert_eq!(cache.status(), Status::Stopped);
        assert!(!manager.is_immutable::<u32>());
        assert_eq!(manager.name(), "bridge-test-shutdown");
        assert!(manager.unwrap::<BridgeManager>().is_ok());

        assert!(matches!(manager.shutdown(), Err(CacheError::IllegalState(_))));
        assert!(matches!(
            manager.get_cache::<String, u32>("c"),
            Err(CacheError::IllegalState(_))
        ));
        assert!(matches!(
            manager.get_caches::<String, u32>(),
            Err(CacheError::IllegalState(_))
        ));
        assert!(matches!(manager.remove_cache("c"), Err(CacheError::IllegalState(_))));
        assert!(matches!(
            manager.create_cache_builder::<String, u32>("d"),
            Err(CacheError::IllegalState(_))
        ));
        assert!(matches!(
            manager.add_immutable_type::<String>(),
            Err(CacheError::IllegalState(_))
        ));
        assert!(matches!(
            manager.is_supported(OptionalFeature::StoreByReference),
            Err(CacheError::IllegalState(_))
        ));
        assert!(matches!(manager.cache_names(), Err(CacheError::IllegalState(_))));
        assert!(matches!(manager.user_transaction(), Err(CacheError::IllegalState(_))));
    }

    #[test]
    fn test_features_and_transactions() {
        let manager = manager("bridge-test-features");
        assert!(manager.is_supported(OptionalFeature::StoreByReference).unwrap());
        assert!(!manager.is_supported(OptionalFeature::Transactions).unwrap());
        assert!(matches!(manager.user_transaction(), Err(CacheError::Unsupported(_))));
        assert!(matches!(
            manager.unwrap::<EngineManager>(),
            Err(CacheError::IllegalArgument(_))
        ));
        manager.shutdown().unwrap();
    }

    #[test]
    fn test_default_manager_ignores_resources() {
        let config = engine_config(DEFAULT_CACHE_MANAGER_NAME, &Scope::new()).unwrap();
        assert_eq!(config, ManagerConfig::named(DEFAULT_CACHE_MANAGER_NAME));
    }
}
