//! Engine Extension Points
//!
//! Loader, writer and listener hooks the engine drives during cache
//! operations. Implementations run on the calling thread.

use std::collections::HashMap;

use crate::engine::Element;
use crate::error::EngineResult;

// == Engine Entry ==
/// Target of a writer delete: the key plus the element being removed, if any.
#[derive(Debug, Clone)]
pub struct EngineEntry<K, V> {
    key: K,
    element: Option<Element<K, V>>,
}

impl<K, V> EngineEntry<K, V> {
    pub fn new(key: K, element: Option<Element<K, V>>) -> Self {
        Self { key, element }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn element(&self) -> Option<&Element<K, V>> {
        self.element.as_ref()
    }
}

// == Engine Loader ==
/// Populates a cache on a miss.
pub trait EngineLoader<K, V>: Send + Sync {
    /// Called when the owning cache becomes alive.
    fn init(&self) {}

    /// Called when the owning cache is disposed.
    fn dispose(&self) {}

    /// Loads the value for `key`, `None` when there is nothing to load.
    fn load(&self, key: &K) -> EngineResult<Option<V>>;

    /// Loads many keys at once; keys with nothing to load are omitted.
    fn load_all(&self, keys: &[K]) -> EngineResult<HashMap<K, V>>;

    /// Produces the loader used by a cache derived from the owning one.
    fn clone_for(&self, cache_name: &str) -> EngineResult<Box<dyn EngineLoader<K, V>>>;
}

// == Engine Writer ==
/// Writes cache mutations through to an external store.
///
/// Batch methods receive a mutable list. On failure after partial success,
/// entries still in the list are the ones not applied.
pub trait EngineWriter<K, V>: Send + Sync {
    fn init(&self) {}

    fn dispose(&self) {}

    fn write(&self, element: &Element<K, V>) -> EngineResult<()>;

    fn write_all(&self, elements: &mut Vec<Element<K, V>>) -> EngineResult<()>;

    fn delete(&self, entry: &EngineEntry<K, V>) -> EngineResult<()>;

    fn delete_all(&self, entries: &mut Vec<EngineEntry<K, V>>) -> EngineResult<()>;

    /// Produces the writer used by a cache derived from the owning one.
    fn clone_for(&self, cache_name: &str) -> EngineResult<Box<dyn EngineWriter<K, V>>>;
}

// == Engine Events ==
/// Element lifecycle events raised by an engine cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEvent {
    Put,
    Updated,
    Removed,
    Expired,
    Evicted,
}

/// Receives element events after the store lock has been released.
///
/// Errors are logged by the engine and never affect cache state.
pub trait EngineListener<K, V>: Send + Sync {
    fn on_event(&self, event: EngineEvent, element: &Element<K, V>) -> anyhow::Result<()>;

    fn dispose(&self) {}
}
