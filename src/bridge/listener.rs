//! Listener Adapter
//!
//! Delivers engine element events to standard entry listeners.

use std::fmt;
use std::sync::Arc;

use crate::api::{CacheEntryListener, NotificationScope};
use crate::bridge::EntryView;
use crate::engine::{Element, EngineEvent, EngineListener};

// == Listener Registration ==
/// A listener together with the scope and delivery mode it was registered with.
pub struct ListenerRegistration<K, V> {
    listener: Arc<dyn CacheEntryListener<K, V>>,
    scope: NotificationScope,
    synchronous: bool,
}

impl<K, V> ListenerRegistration<K, V> {
    pub fn new(
        listener: Arc<dyn CacheEntryListener<K, V>>,
        scope: NotificationScope,
        synchronous: bool,
    ) -> Self {
        Self {
            listener,
            scope,
            synchronous,
        }
    }

    pub fn listener(&self) -> &Arc<dyn CacheEntryListener<K, V>> {
        &self.listener
    }

    pub fn scope(&self) -> NotificationScope {
        self.scope
    }

    /// Recorded as requested; the engine always notifies on the calling thread.
    pub fn is_synchronous(&self) -> bool {
        self.synchronous
    }
}

impl<K, V> Clone for ListenerRegistration<K, V> {
    fn clone(&self) -> Self {
        Self {
            listener: Arc::clone(&self.listener),
            scope: self.scope,
            synchronous: self.synchronous,
        }
    }
}

impl<K, V> fmt::Debug for ListenerRegistration<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("scope", &self.scope)
            .field("synchronous", &self.synchronous)
            .finish_non_exhaustive()
    }
}

// == Listener Adapter ==
pub struct ListenerAdapter<K, V> {
    registration: ListenerRegistration<K, V>,
}

impl<K, V> ListenerAdapter<K, V> {
    pub fn new(registration: ListenerRegistration<K, V>) -> Self {
        Self { registration }
    }

    pub fn registration(&self) -> &ListenerRegistration<K, V> {
        &self.registration
    }
}

impl<K, V> EngineListener<K, V> for ListenerAdapter<K, V>
where
    K: Send + Sync,
    V: Send + Sync,
{
    fn on_event(&self, event: EngineEvent, element: &Element<K, V>) -> anyhow::Result<()> {
        // Every engine event is local
        if self.registration.scope == NotificationScope::Remote {
            return Ok(());
        }

        let entry = EntryView::new(element);
        let listener = &self.registration.listener;
        match event {
            EngineEvent::Put => listener.on_created(&entry),
            EngineEvent::Updated => listener.on_updated(&entry),
            EngineEvent::Removed => listener.on_removed(&entry),
            EngineEvent::Expired => listener.on_expired(&entry),
            // No standard counterpart
            EngineEvent::Evicted => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Entry;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl CacheEntryListener<String, u32> for Recorder {
        fn on_created(&self, entry: &dyn Entry<String, u32>) -> anyhow::Result<()> {
            self.events.lock().push(format!("created {}={}", entry.key(), entry.value()));
            Ok(())
        }

        fn on_updated(&self, entry: &dyn Entry<String, u32>) -> anyhow::Result<()> {
            self.events.lock().push(format!("updated {}", entry.key()));
            Ok(())
        }

        fn on_removed(&self, entry: &dyn Entry<String, u32>) -> anyhow::Result<()> {
            self.events.lock().push(format!("removed {}", entry.key()));
            Ok(())
        }

        fn on_expired(&self, entry: &dyn Entry<String, u32>) -> anyhow::Result<()> {
            self.events.lock().push(format!("expired {}", entry.key()));
            Ok(())
        }
    }

    fn adapter(recorder: &Arc<Recorder>, scope: NotificationScope) -> ListenerAdapter<String, u32> {
        let listener = Arc::clone(recorder) as Arc<dyn CacheEntryListener<String, u32>>;
        ListenerAdapter::new(ListenerRegistration::new(listener, scope, true))
    }

    #[test]
    fn test_events_map_to_callbacks() {
        let recorder = Arc::new(Recorder::default());
        let adapter = adapter(&recorder, NotificationScope::All);
        let element = Element::new("a".to_string(), 1);

        for event in [
            EngineEvent::Put,
            EngineEvent::Updated,
            EngineEvent::Removed,
            EngineEvent::Expired,
            EngineEvent::Evicted,
        ] {
            adapter.on_event(event, &element).unwrap();
        }

        assert_eq!(
            *recorder.events.lock(),
            vec!["created a=1", "updated a", "removed a", "expired a"]
        );
    }

    #[test]
    fn test_remote_scope_hears_nothing() {
        let recorder = Arc::new(Recorder::default());
        let adapter = adapter(&recorder, NotificationScope::Remote);

        adapter
            .on_event(EngineEvent::Put, &Element::new("a".to_string(), 1))
            .unwrap();
        assert!(recorder.events.lock().is_empty());
        assert_eq!(adapter.registration().scope(), NotificationScope::Remote);
        assert!(adapter.registration().is_synchronous());
    }
}
