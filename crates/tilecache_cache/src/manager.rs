use std::{path::Path, sync::Arc};

use tracing::{debug, warn};

use crate::{
    entry::{CacheEntry, HeaderRecord},
    error::CacheError,
    key::CacheKey,
    sqlite::SqliteBackend,
    store::{KvBackend, MemoryBackend},
};

/// Response cache addressed by request path.
///
/// Cloning is cheap; every clone shares the same backend handle.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn KvBackend>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Opens the persistent SQLite store under `dir`.
    pub fn open(dir: impl AsRef<Path>, read_connections: usize) -> Result<Self, CacheError> {
        let backend = SqliteBackend::open(dir, read_connections)?;
        Ok(Self::with_backend(Arc::new(backend)))
    }

    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }

    pub fn with_backend(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// Reads the header and body records for `path` from one snapshot.
    ///
    /// Returns `Ok(None)` when either record is missing or the header record
    /// does not decode. Only backend failures are reported as errors.
    pub fn try_load(&self, path: &str) -> Result<Option<CacheEntry>, CacheError> {
        let header_key = CacheKey::header(path).encode()?;
        let body_key = CacheKey::body(path).encode()?;

        let mut records = self
            .backend
            .get_many(&[header_key.as_slice(), body_key.as_slice()])?
            .into_iter();
        let (Some(Some(raw_headers)), Some(Some(body))) = (records.next(), records.next()) else {
            return Ok(None);
        };

        let headers = match HeaderRecord::decode(&raw_headers) {
            Ok(headers) => headers,
            Err(e) => {
                warn!(
                    target: "tilecache::cache",
                    %path,
                    error = %e,
                    "Undecodable header record; treating as miss"
                );
                return Ok(None);
            }
        };

        Ok(Some(CacheEntry::new(headers, body)))
    }

    /// Like [`try_load`](Self::try_load), with backend failures logged and
    /// reported as a miss.
    pub fn load(&self, path: &str) -> Option<CacheEntry> {
        match self.try_load(path) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    target: "tilecache::cache",
                    %path,
                    error = %e,
                    "Cache read failed; treating as miss"
                );
                None
            }
        }
    }

    /// Writes both records for `path` in one transaction, replacing any
    /// previous entry.
    pub fn save(&self, path: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let header_key = CacheKey::header(path).encode()?;
        let body_key = CacheKey::body(path).encode()?;
        let raw_headers = entry.headers.encode()?;

        self.backend.put_many(&[
            (header_key.as_slice(), raw_headers.as_slice()),
            (body_key.as_slice(), entry.body.as_ref()),
        ])?;

        debug!(
            target: "tilecache::cache",
            %path,
            body_len = entry.body.len(),
            "Stored cache entry"
        );
        Ok(())
    }

    /// [`load`](Self::load) on the blocking pool.
    pub async fn load_async(&self, path: String) -> Option<CacheEntry> {
        let store = self.clone();
        match tokio::task::spawn_blocking(move || store.load(&path)).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(target: "tilecache::cache", error = %e, "Cache read task failed");
                None
            }
        }
    }

    /// [`save`](Self::save) on the blocking pool.
    pub async fn save_async(&self, path: String, entry: CacheEntry) -> Result<(), CacheError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.save(&path, &entry))
            .await
            .map_err(|e| CacheError::Join(e.to_string()))?
    }

    pub fn close(&self) -> Result<(), CacheError> {
        self.backend.close()
    }
}
