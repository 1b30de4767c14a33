use std::path::PathBuf;

/// Errors raised by the cache store and its backends.
///
/// None of these are fatal to request handling: callers degrade to
/// "treat as miss" or "skip caching". Only [`CacheStore::open`] failures at
/// startup abort the process.
///
/// [`CacheStore::open`]: crate::CacheStore::open
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache directory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cache record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("cached header record is not a valid header map: {0}")]
    InvalidHeader(String),

    #[error("cache backend lock poisoned")]
    Poisoned,

    #[error("cache task failed: {0}")]
    Join(String),
}
