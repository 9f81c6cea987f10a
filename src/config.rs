//! Configuration Module
//!
//! Engine-native cache and manager configuration. A manager named `<name>`
//! may be configured by an `engine-<name>.json` resource.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Default bound on the number of in-memory elements per cache.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

// == Cache Config ==
/// Configuration of a single engine cache.
///
/// Zero for `time_to_idle_seconds` / `time_to_live_seconds` means no limit in
/// that dimension, zero for `max_entries_local_heap` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Cache name
    pub name: String,
    /// Maximum number of elements held in memory
    pub max_entries_local_heap: usize,
    /// Elements never expire when set
    pub eternal: bool,
    /// Seconds since last access before an element expires
    pub time_to_idle_seconds: u64,
    /// Seconds since creation or last update before an element expires
    pub time_to_live_seconds: u64,
    /// Evicted elements would spill to disk
    pub overflow_to_disk: bool,
    /// Values are copied when read
    pub copy_on_read: bool,
    /// Values are copied when written
    pub copy_on_write: bool,
    /// Hit/miss statistics are exposed
    pub statistics: bool,
}

impl CacheConfig {
    /// Creates a default configuration for the named cache.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Store-by-value holds only when values are copied in both directions.
    pub fn is_store_by_value(&self) -> bool {
        self.copy_on_read && self.copy_on_write
    }

    /// Effective idle timeout, `None` when eternal or unset.
    pub fn time_to_idle(&self) -> Option<Duration> {
        if self.eternal || self.time_to_idle_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.time_to_idle_seconds))
        }
    }

    /// Effective live timeout, `None` when eternal or unset.
    pub fn time_to_live(&self) -> Option<Duration> {
        if self.eternal || self.time_to_live_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.time_to_live_seconds))
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_entries_local_heap: DEFAULT_MAX_ENTRIES,
            eternal: false,
            time_to_idle_seconds: 0,
            time_to_live_seconds: 0,
            overflow_to_disk: false,
            copy_on_read: false,
            copy_on_write: false,
            statistics: false,
        }
    }
}

// == Manager Config ==
/// Configuration of an engine manager: a template for programmatically
/// created caches plus the caches declared up front.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    /// Manager name
    pub name: String,
    /// Template for caches created without a declaration
    pub default_cache: CacheConfig,
    /// Declared caches
    pub caches: Vec<CacheConfig>,
}

impl ManagerConfig {
    /// Creates an unconfigured manager configuration.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Resource name holding the configuration of the named manager.
    pub fn resource_name(manager_name: &str) -> String {
        format!("engine-{}.json", manager_name)
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let config: ManagerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        debug!("Reading engine configuration from {}", path.display());
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Looks up a declared cache.
    pub fn cache(&self, name: &str) -> Option<&CacheConfig> {
        self.caches.iter().find(|c| c.name == name)
    }

    /// Rejects empty and duplicate cache names.
    pub fn validate(&self) -> EngineResult<()> {
        let mut seen = HashSet::new();
        for cache in &self.caches {
            if cache.name.is_empty() {
                return Err(EngineError::Config(
                    "declared cache without a name".to_string(),
                ));
            }
            if !seen.insert(cache.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "cache '{}' declared more than once",
                    cache.name
                )));
            }
        }
        Ok(())
    }
}
