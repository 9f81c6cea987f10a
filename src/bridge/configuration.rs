//! Cache Configuration Snapshot
//!
//! The standard view of a cache's configuration, fixed once the cache is built.

use serde::Serialize;

use crate::api::{Expiry, ExpiryType, IsolationLevel, TimeUnit, TransactionMode};
use crate::config::CacheConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfiguration {
    pub(crate) store_by_value: bool,
    pub(crate) read_through: bool,
    pub(crate) write_through: bool,
    pub(crate) statistics_enabled: bool,
    pub(crate) isolation_level: IsolationLevel,
    pub(crate) transaction_mode: TransactionMode,
    pub(crate) expiry_accessed: Expiry,
    pub(crate) expiry_modified: Expiry,
}

impl BridgeConfiguration {
    /// Describes a cache that was configured on the engine side, such as a
    /// cache declared in a manager configuration resource.
    pub fn from_engine(config: &CacheConfig) -> Self {
        Self {
            store_by_value: config.is_store_by_value(),
            read_through: false,
            write_through: false,
            statistics_enabled: config.statistics,
            isolation_level: IsolationLevel::None,
            transaction_mode: TransactionMode::None,
            expiry_accessed: engine_expiry(config.eternal, config.time_to_idle_seconds),
            expiry_modified: engine_expiry(config.eternal, config.time_to_live_seconds),
        }
    }

    pub fn is_store_by_value(&self) -> bool {
        self.store_by_value
    }

    pub fn is_read_through(&self) -> bool {
        self.read_through
    }

    pub fn is_write_through(&self) -> bool {
        self.write_through
    }

    pub fn is_statistics_enabled(&self) -> bool {
        self.statistics_enabled
    }

    pub fn is_transaction_enabled(&self) -> bool {
        self.transaction_mode != TransactionMode::None
    }

    pub fn transaction_isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn transaction_mode(&self) -> TransactionMode {
        self.transaction_mode
    }

    pub fn expiry(&self, kind: ExpiryType) -> Expiry {
        match kind {
            ExpiryType::Accessed => self.expiry_accessed,
            ExpiryType::Modified => self.expiry_modified,
        }
    }
}

fn engine_expiry(eternal: bool, seconds: u64) -> Expiry {
    if eternal || seconds == 0 {
        Expiry::ETERNAL
    } else {
        Expiry::new(TimeUnit::Seconds, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_engine_maps_expiry() {
        let config = CacheConfig {
            time_to_idle_seconds: 360,
            time_to_live_seconds: 1000,
            copy_on_read: true,
            ..CacheConfig::new("sample")
        };
        let snapshot = BridgeConfiguration::from_engine(&config);

        assert!(!snapshot.is_store_by_value());
        assert_eq!(
            snapshot.expiry(ExpiryType::Accessed),
            Expiry::new(TimeUnit::Seconds, 360)
        );
        assert_eq!(
            snapshot.expiry(ExpiryType::Modified),
            Expiry::new(TimeUnit::Seconds, 1000)
        );
        assert!(!snapshot.is_read_through());
        assert!(!snapshot.is_transaction_enabled());
    }

    #[test]
    fn test_eternal_engine_cache_has_eternal_expiry() {
        let config = CacheConfig {
            eternal: true,
            time_to_live_seconds: 60,
            copy_on_read: true,
            copy_on_write: true,
            ..CacheConfig::new("forever")
        };
        let snapshot = BridgeConfiguration::from_engine(&config);

        assert!(snapshot.is_store_by_value());
        assert_eq!(snapshot.expiry(ExpiryType::Modified), Expiry::ETERNAL);
        assert_eq!(snapshot.expiry(ExpiryType::Accessed), Expiry::ETERNAL);
    }
}
