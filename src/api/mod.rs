//! Standard Cache API Module
//!
//! The vocabulary applications program against: lifecycle status, expiry,
//! optional features and the loader/writer/listener contracts they plug in.

mod traits;
mod types;

// Re-export public types
pub use traits::{CacheEntryListener, CacheLoader, CacheWriter, Entry};
pub use types::{
    Expiry, ExpiryType, IsolationLevel, NotificationScope, OptionalFeature, Status, TimeUnit,
    TransactionMode,
};
