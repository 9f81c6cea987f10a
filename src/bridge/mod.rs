//! Bridge Module
//!
//! Presents engine caches and managers under the standard cache API: entry
//! views, status mapping, loader/writer/listener adapters, the cache and
//! manager façades and the cache builder.

mod builder;
mod cache;
mod configuration;
mod entry;
mod listener;
mod loader;
mod manager;
mod status;
mod writer;

// Re-export public types
pub use builder::BridgeCacheBuilder;
pub use cache::BridgeCache;
pub use configuration::BridgeConfiguration;
pub use entry::EntryView;
pub use listener::{ListenerAdapter, ListenerRegistration};
pub use loader::LoaderAdapter;
pub use manager::BridgeManager;
pub use status::adapt_status;
pub use writer::WriterAdapter;
