//! Standard API Contracts
//!
//! Traits implemented by applications and consumed by caches. Application
//! failures travel as `anyhow::Error`.

use std::collections::HashMap;

use crate::engine::CacheKey;

// == Entry ==
/// A key/value pair as seen by loaders, writers and listeners.
pub trait Entry<K, V> {
    fn key(&self) -> &K;

    fn value(&self) -> &V;
}

// == Cache Loader ==
/// Supplies values for keys missing from a read-through cache.
pub trait CacheLoader<K: CacheKey, V>: Send + Sync {
    /// Loads the value for `key`, `None` when there is none.
    fn load(&self, key: &K) -> anyhow::Result<Option<V>>;

    /// Loads several keys. Keys without a value are left out of the map.
    fn load_all(&self, keys: &[K]) -> anyhow::Result<HashMap<K, V>> {
        let mut loaded = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.load(key)? {
                loaded.insert(key.clone(), value);
            }
        }
        Ok(loaded)
    }
}

// == Cache Writer ==
/// Receives the mutations of a write-through cache.
///
/// Batch methods get a mutable list and must remove every item they handle.
/// When they fail, the items left in the list are the ones still pending.
pub trait CacheWriter<K: CacheKey, V>: Send + Sync {
    fn write(&self, entry: &dyn Entry<K, V>) -> anyhow::Result<()>;

    fn write_all(&self, entries: &mut Vec<&dyn Entry<K, V>>) -> anyhow::Result<()> {
        while let Some(&entry) = entries.first() {
            self.write(entry)?;
            entries.remove(0);
        }
        Ok(())
    }

    fn delete(&self, key: &K) -> anyhow::Result<()>;

    fn delete_all(&self, keys: &mut Vec<K>) -> anyhow::Result<()> {
        while let Some(key) = keys.first() {
            self.delete(key)?;
            keys.remove(0);
        }
        Ok(())
    }
}

// == Cache Entry Listener ==
/// Observes entry events. Every callback defaults to doing nothing.
pub trait CacheEntryListener<K, V>: Send + Sync {
    fn on_created(&self, _entry: &dyn Entry<K, V>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_updated(&self, _entry: &dyn Entry<K, V>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_removed(&self, _entry: &dyn Entry<K, V>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_expired(&self, _entry: &dyn Entry<K, V>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Pair(String, u32);

    impl Entry<String, u32> for Pair {
        fn key(&self) -> &String {
            &self.0
        }

        fn value(&self) -> &u32 {
            &self.1
        }
    }

    /// Fails on the key "bad", records everything else.
    #[derive(Default)]
    struct PickyWriter {
        written: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
    }

    impl CacheWriter<String, u32> for PickyWriter {
        fn write(&self, entry: &dyn Entry<String, u32>) -> anyhow::Result<()> {
            if entry.key() == "bad" {
                anyhow::bail!("cannot write 'bad'");
            }
            self.written.lock().push(entry.key().clone());
            Ok(())
        }

        fn delete(&self, key: &String) -> anyhow::Result<()> {
            if key == "bad" {
                anyhow::bail!("cannot delete 'bad'");
            }
            self.deleted.lock().push(key.clone());
            Ok(())
        }
    }

    struct SquareLoader;

    impl CacheLoader<u32, u64> for SquareLoader {
        fn load(&self, key: &u32) -> anyhow::Result<Option<u64>> {
            Ok((*key != 0).then(|| u64::from(*key) * u64::from(*key)))
        }
    }

    #[test]
    fn test_default_write_all_leaves_residue() {
        let writer = PickyWriter::default();
        let a = Pair("a".to_string(), 1);
        let bad = Pair("bad".to_string(), 2);
        let c = Pair("c".to_string(), 3);
        let mut entries: Vec<&dyn Entry<String, u32>> = vec![&a, &bad, &c];

        assert!(writer.write_all(&mut entries).is_err());

        let pending: Vec<&String> = entries.iter().map(|entry| entry.key()).collect();
        assert_eq!(pending, vec!["bad", "c"]);
        assert_eq!(*writer.written.lock(), vec!["a".to_string()]);
    }

    #[test]
    fn test_default_delete_all_leaves_residue() {
        let writer = PickyWriter::default();
        let mut keys = vec!["a".to_string(), "b".to_string(), "bad".to_string()];

        assert!(writer.delete_all(&mut keys).is_err());
        assert_eq!(keys, vec!["bad".to_string()]);

        let mut keys = vec!["x".to_string()];
        writer.delete_all(&mut keys).unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn test_default_load_all_omits_missing() {
        let loaded = SquareLoader.load_all(&[0, 2, 3]).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[&2], 4);
        assert_eq!(loaded[&3], 9);
    }
}
