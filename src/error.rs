//! Error types for the cache bridge
//!
//! Provides unified error handling using thiserror. `EngineError` covers the
//! backing engine and its extensions, `CacheError` is what the standard API
//! surface returns.

use thiserror::Error;

// == Engine Error Enum ==
/// Failures raised by the backing engine, its manager or its extensions.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Operation on a cache that is not in the alive state
    #[error("Cache '{0}' is not alive")]
    NotAlive(String),

    /// Operation on a manager that has been shut down
    #[error("Cache manager '{0}' has been shut down")]
    ManagerShutdown(String),

    /// A cache with the same name is already registered
    #[error("Cache '{0}' already exists")]
    CacheExists(String),

    /// Typed lookup with key/value types other than the cache was created with
    #[error("Cache '{name}' was created with different key/value types")]
    TypeMismatch { name: String },

    /// Loader extension failed to populate the cache
    #[error("Cache loader failed: {0}")]
    Loader(#[source] anyhow::Error),

    /// Writer extension failed; `pending` operations were not applied
    #[error("Cache writer failed with {pending} operation(s) pending: {source}")]
    Writer {
        pending: usize,
        #[source]
        source: anyhow::Error,
    },

    /// Extension refused to be cloned for a derived cache
    #[error("Extension cannot be cloned for cache '{0}'")]
    CloneNotSupported(String),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration resource could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration resource could not be parsed
    #[error("Malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
}

// == Cache Error Enum ==
/// Error kinds surfaced by the standard cache API.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Required input missing or unwrap to an unrelated type
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// Operation on an uninitialised or stopped cache or manager
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Builder configuration the engine cannot honour
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operation this bridge does not provide
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Failure propagated unchanged from the engine
    #[error(transparent)]
    Engine(#[from] EngineError),
}

// == Result Type Aliases ==
/// Convenience Result type for the standard API surface.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Convenience Result type for the engine.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
