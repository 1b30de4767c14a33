//! SQLite-backed [`KvBackend`].
//!
//! One writer connection and a few reader connections on the same database
//! file. The database runs in WAL mode, so every read transaction sees a
//! consistent snapshot while the writer commits.

use std::{
    path::{Path, PathBuf},
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use crate::{error::CacheError, store::KvBackend};

/// File name of the cache database inside the configured cache directory.
pub const DB_FILE_NAME: &str = "tilecache.sqlite3";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key   BLOB PRIMARY KEY NOT NULL,
    value BLOB NOT NULL
) WITHOUT ROWID";

const SELECT_VALUE: &str = "SELECT value FROM kv WHERE key = ?1";

const UPSERT_VALUE: &str = "INSERT INTO kv (key, value) VALUES (?1, ?2)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value";

pub struct SqliteBackend {
    path: PathBuf,
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .field("readers", &self.readers.len())
            .finish()
    }
}

impl SqliteBackend {
    /// Opens (or creates) the cache database under `dir`.
    pub fn open(dir: impl AsRef<Path>, read_connections: usize) -> Result<Self, CacheError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| CacheError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(DB_FILE_NAME);
        let writer = Connection::open(&path)?;
        writer.busy_timeout(BUSY_TIMEOUT)?;
        let journal_mode: String =
            writer.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        writer.pragma_update(None, "synchronous", "NORMAL")?;
        writer.execute_batch(SCHEMA)?;

        let readers = (0..read_connections.max(1))
            .map(|_| {
                let conn = Connection::open(&path)?;
                conn.busy_timeout(BUSY_TIMEOUT)?;
                Ok(Mutex::new(conn))
            })
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;

        info!(
            target: "tilecache::cache",
            path = %path.display(),
            journal_mode = %journal_mode,
            readers = readers.len(),
            "Opened SQLite cache store"
        );

        Ok(Self {
            path,
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        let idx = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        self.readers[idx].lock().map_err(|_| CacheError::Poisoned)
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.writer.lock().map_err(|_| CacheError::Poisoned)
    }
}

impl KvBackend for SqliteBackend {
    fn get_many(&self, keys: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        let mut conn = self.reader()?;
        // Deferred: the snapshot is taken by the first SELECT and held until commit.
        let tx = conn.transaction()?;
        let mut values = Vec::with_capacity(keys.len());
        {
            let mut stmt = tx.prepare_cached(SELECT_VALUE)?;
            for key in keys {
                let value = stmt
                    .query_row([key], |row| row.get::<_, Vec<u8>>(0))
                    .optional()?;
                values.push(value);
            }
        }
        tx.commit()?;
        Ok(values)
    }

    fn put_many(&self, pairs: &[(&[u8], &[u8])]) -> Result<(), CacheError> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_VALUE)?;
            for (key, value) in pairs {
                stmt.execute([key, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn close(&self) -> Result<(), CacheError> {
        let conn = self.writer()?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        debug!(
            target: "tilecache::cache",
            path = %self.path.display(),
            "Checkpointed SQLite cache store"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DB_FILE_NAME, SqliteBackend};
    use crate::store::KvBackend;

    #[test]
    fn creates_database_file_and_reads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = SqliteBackend::open(dir.path().join("nested"), 2).expect("open");
        assert!(dir.path().join("nested").join(DB_FILE_NAME).exists());

        backend
            .put_many(&[(&b"k1"[..], &b"v1"[..]), (&b"k2"[..], &b""[..])])
            .expect("put");
        let got = backend
            .get_many(&[&b"k1"[..], &b"k2"[..], &b"k3"[..]])
            .expect("get");
        assert_eq!(got, vec![Some(b"v1".to_vec()), Some(Vec::new()), None]);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let backend = SqliteBackend::open(dir.path(), 1).expect("open");
            backend.put_many(&[(&b"k"[..], &b"v"[..])]).expect("put");
            backend.close().expect("close");
        }
        let backend = SqliteBackend::open(dir.path(), 1).expect("reopen");
        let got = backend.get_many(&[&b"k"[..]]).expect("get");
        assert_eq!(got, vec![Some(b"v".to_vec())]);
    }

    #[test]
    fn upsert_overwrites_previous_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = SqliteBackend::open(dir.path(), 1).expect("open");
        backend.put_many(&[(&b"k"[..], &b"old"[..])]).expect("put");
        backend.put_many(&[(&b"k"[..], &b"new"[..])]).expect("put");
        let got = backend.get_many(&[&b"k"[..]]).expect("get");
        assert_eq!(got, vec![Some(b"new".to_vec())]);
    }
}
