//! Persistent response cache.
//!
//! A cached response is stored as two records under the same request path:
//! a header record (JSON map of header name to values) and a body record
//! (raw bytes). Both records are written in one transaction and read from one
//! snapshot, so a reader never sees a header/body pair from different writes.

mod entry;
mod error;
mod key;
mod manager;
mod policy;
mod sqlite;
mod store;

pub use entry::{CacheEntry, HeaderRecord};
pub use error::CacheError;
pub use key::{CacheKey, RecordKind};
pub use manager::CacheStore;
pub use policy::CachePolicy;
pub use sqlite::SqliteBackend;
pub use store::{KvBackend, MemoryBackend};
