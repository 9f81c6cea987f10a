//! Writer Adapter
//!
//! Drives an application `CacheWriter` through the engine's writer hook,
//! carrying the writer's batch residue back to the engine.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::api::{CacheWriter, Entry};
use crate::bridge::EntryView;
use crate::engine::{CacheKey, CacheValue, Element, EngineEntry, EngineWriter};
use crate::error::{EngineError, EngineResult};

pub struct WriterAdapter<K: CacheKey, V> {
    delegate: Arc<dyn CacheWriter<K, V>>,
}

impl<K: CacheKey, V> WriterAdapter<K, V> {
    pub fn new(delegate: Arc<dyn CacheWriter<K, V>>) -> Self {
        Self { delegate }
    }

    /// The application writer this adapter wraps.
    pub fn delegate(&self) -> &Arc<dyn CacheWriter<K, V>> {
        &self.delegate
    }
}

impl<K: CacheKey, V> Clone for WriterAdapter<K, V> {
    fn clone(&self) -> Self {
        Self {
            delegate: Arc::clone(&self.delegate),
        }
    }
}

fn writer_error(pending: usize, source: anyhow::Error) -> EngineError {
    warn!("Cache writer failed, {} operation(s) pending: {:#}", pending, source);
    EngineError::Writer { pending, source }
}

impl<K: CacheKey, V: CacheValue> EngineWriter<K, V> for WriterAdapter<K, V> {
    fn write(&self, element: &Element<K, V>) -> EngineResult<()> {
        self.delegate
            .write(&EntryView::new(element))
            .map_err(|source| writer_error(1, source))
    }

    fn write_all(&self, elements: &mut Vec<Element<K, V>>) -> EngineResult<()> {
        let (result, pending) = {
            let views: Vec<EntryView<'_, K, V>> = elements.iter().map(EntryView::new).collect();
            let mut entries: Vec<&dyn Entry<K, V>> =
                views.iter().map(|view| view as &dyn Entry<K, V>).collect();
            let result = self.delegate.write_all(&mut entries);
            let pending: HashSet<K> = entries.iter().map(|entry| entry.key().clone()).collect();
            (result, pending)
        };

        match result {
            Ok(()) => {
                elements.clear();
                Ok(())
            }
            Err(source) => {
                elements.retain(|element| pending.contains(element.key()));
                Err(writer_error(elements.len(), source))
            }
        }
    }

    fn delete(&self, entry: &EngineEntry<K, V>) -> EngineResult<()> {
        self.delegate
            .delete(entry.key())
            .map_err(|source| writer_error(1, source))
    }

    fn delete_all(&self, entries: &mut Vec<EngineEntry<K, V>>) -> EngineResult<()> {
        let mut keys: Vec<K> = entries.iter().map(|entry| entry.key().clone()).collect();

        match self.delegate.delete_all(&mut keys) {
            Ok(()) => {
                entries.clear();
                Ok(())
            }
            Err(source) => {
                let pending: HashSet<K> = keys.into_iter().collect();
                entries.retain(|entry| pending.contains(entry.key()));
                Err(writer_error(entries.len(), source))
            }
        }
    }

    fn clone_for(&self, _cache_name: &str) -> EngineResult<Box<dyn EngineWriter<K, V>>> {
        Ok(Box::new(self.clone()))
    }
}

impl<K: CacheKey, V> fmt::Debug for WriterAdapter<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterAdapter").finish_non_exhaustive()
    }
}
