//! Caching Entry Point
//!
//! Process-wide locator handing out cache managers. One manager exists per
//! (scope, name) pair until it is shut down.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::api::{OptionalFeature, Status};
use crate::bridge::BridgeManager;
use crate::error::{CacheError, Result};

/// Name of the manager returned when no name is given.
pub const DEFAULT_CACHE_MANAGER_NAME: &str = "__default__";

// == Scope ==
/// Identifies who is asking for a manager and where its configuration
/// resources live. Scopes compare by identity only.
#[derive(Clone)]
pub struct Scope {
    id: u64,
    resource_root: Option<PathBuf>,
}

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

static SYSTEM_SCOPE: Lazy<Scope> = Lazy::new(|| Scope {
    id: 0,
    resource_root: std::env::current_dir().ok(),
});

impl Scope {
    /// A fresh scope without resources.
    pub fn new() -> Self {
        Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            resource_root: None,
        }
    }

    /// A fresh scope resolving resources under `root`.
    pub fn with_resource_root(root: impl Into<PathBuf>) -> Self {
        Self {
            resource_root: Some(root.into()),
            ..Self::new()
        }
    }

    /// The process default scope, resolving resources in the working directory.
    pub fn system() -> Self {
        SYSTEM_SCOPE.clone()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn resource_root(&self) -> Option<&Path> {
        self.resource_root.as_deref()
    }

    /// Path of the named resource, if it exists in this scope.
    pub fn find_resource(&self, name: &str) -> Option<PathBuf> {
        let path = self.resource_root.as_ref()?.join(name);
        path.is_file().then_some(path)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Scope {}

impl Hash for Scope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("resource_root", &self.resource_root)
            .finish()
    }
}

// == Locator ==
/// Managers by (scope id, manager name).
static MANAGERS: Lazy<Mutex<HashMap<(u64, String), Arc<BridgeManager>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// The default manager of the system scope.
pub fn get_cache_manager() -> Result<Arc<BridgeManager>> {
    get_cache_manager_in(&Scope::system(), DEFAULT_CACHE_MANAGER_NAME)
}

/// The named manager of the system scope.
pub fn get_cache_manager_named(name: &str) -> Result<Arc<BridgeManager>> {
    get_cache_manager_in(&Scope::system(), name)
}

/// The named manager of `scope`, created on first use. A manager that has
/// been shut down is replaced by a new one.
pub fn get_cache_manager_in(scope: &Scope, name: &str) -> Result<Arc<BridgeManager>> {
    if name.is_empty() {
        return Err(CacheError::IllegalArgument(
            "cache manager name must not be empty".to_string(),
        ));
    }

    let mut managers = MANAGERS.lock();
    let key = (scope.id(), name.to_string());
    if let Some(existing) = managers.get(&key) {
        if existing.status() == Status::Started {
            return Ok(Arc::clone(existing));
        }
        debug!("Replacing stopped cache manager '{}'", name);
    }

    let manager = BridgeManager::new(name, scope.clone())?;
    managers.insert(key, Arc::clone(&manager));
    Ok(manager)
}

/// Optional features this implementation provides.
pub fn is_supported(feature: OptionalFeature) -> bool {
    match feature {
        OptionalFeature::StoreByReference => true,
        OptionalFeature::Transactions | OptionalFeature::Annotations => false,
    }
}

/// Shuts down and forgets every manager.
pub fn close() {
    let managers: Vec<Arc<BridgeManager>> = MANAGERS.lock().drain().map(|(_, m)| m).collect();
    info!("Closing {} cache manager(s)", managers.len());
    shutdown_all(managers);
}

/// Shuts down and forgets the managers of one scope.
pub fn close_scope(scope: &Scope) {
    let managers: Vec<Arc<BridgeManager>> = {
        let mut table = MANAGERS.lock();
        let keys: Vec<(u64, String)> = table
            .keys()
            .filter(|(scope_id, _)| *scope_id == scope.id())
            .cloned()
            .collect();
        keys.iter().filter_map(|key| table.remove(key)).collect()
    };
    info!(
        "Closing {} cache manager(s) of scope {}",
        managers.len(),
        scope.id()
    );
    shutdown_all(managers);
}

fn shutdown_all(managers: Vec<Arc<BridgeManager>>) {
    for manager in managers {
        // Managers shut down directly are already stopped
        if manager.status() == Status::Started {
            if let Err(err) = manager.shutdown() {
                debug!("Cache manager '{}' already stopped: {}", manager.name(), err);
            }
        }
    }
}
