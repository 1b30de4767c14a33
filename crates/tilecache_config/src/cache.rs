use serde::Deserialize;

// =======================================================
// CACHE CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the persistent store. Empty keeps the cache in memory.
    pub dir: String,
    /// Number of SQLite reader connections.
    pub read_connections: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: "cache".into(),
            read_connections: 4,
        }
    }
}

impl CacheConfig {
    pub fn dir(&self) -> Option<&str> {
        let dir = self.dir.trim();
        (!dir.is_empty()).then_some(dir)
    }

    pub fn read_connections(&self) -> usize {
        self.read_connections
    }

    pub(crate) fn apply_defaults_from(&mut self, defaults: &CacheConfig) {
        if self.read_connections == 0 {
            self.read_connections = defaults.read_connections;
        }
    }
}
