//! Entry View
//!
//! Borrowed view of an engine element as a standard API entry.

use std::hash::{Hash, Hasher};

use crate::api::Entry;
use crate::engine::Element;

/// Reads key and value straight from the element; holds no state of its own.
#[derive(Debug)]
pub struct EntryView<'a, K, V> {
    element: &'a Element<K, V>,
}

impl<'a, K, V> EntryView<'a, K, V> {
    pub fn new(element: &'a Element<K, V>) -> Self {
        Self { element }
    }

    pub fn element(&self) -> &'a Element<K, V> {
        self.element
    }
}

impl<K, V> Clone for EntryView<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for EntryView<'_, K, V> {}

impl<K, V> Entry<K, V> for EntryView<'_, K, V> {
    fn key(&self) -> &K {
        self.element.key()
    }

    fn value(&self) -> &V {
        self.element.value()
    }
}

// Entries are equal when both key and value are equal
impl<K: PartialEq, V: PartialEq> PartialEq for EntryView<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key() && self.value() == other.value()
    }
}

impl<K: Eq, V: Eq> Eq for EntryView<'_, K, V> {}

impl<K: Hash, V: Hash> Hash for EntryView<'_, K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
        self.value().hash(state);
    }
}
