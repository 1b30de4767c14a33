use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::CacheError;

/// Minimal transactional key-value engine the cache is built on.
///
/// Implementations must read all keys of one `get_many` call from a single
/// snapshot, and apply all pairs of one `put_many` call atomically.
pub trait KvBackend: Send + Sync + 'static {
    fn get_many(&self, keys: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>, CacheError>;

    fn put_many(&self, pairs: &[(&[u8], &[u8])]) -> Result<(), CacheError>;

    /// Flushes and releases engine resources. Called once at shutdown.
    fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Non-persistent backend. One lock guards the whole map, which gives both
/// snapshot reads and atomic multi-key writes.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvBackend for MemoryBackend {
    fn get_many(&self, keys: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        let map = self.inner.read().map_err(|_| CacheError::Poisoned)?;
        Ok(keys.iter().map(|key| map.get(*key).cloned()).collect())
    }

    fn put_many(&self, pairs: &[(&[u8], &[u8])]) -> Result<(), CacheError> {
        let mut map = self.inner.write().map_err(|_| CacheError::Poisoned)?;
        for (key, value) in pairs {
            map.insert(key.to_vec(), value.to_vec());
        }
        Ok(())
    }
}
