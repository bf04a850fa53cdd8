use std::path::Path;

use dashmap::DashMap;
use rocksdb::{Options, DB};

use crate::contracts::{validate_key, CounterRecord, CounterStore, StoreError};

/// Key prefix for counter records
const COUNTER_PREFIX: &str = "cnt";

/// RocksDB-backed counter store.
///
/// Counts are held in a concurrent map seeded lazily from disk on the first
/// touch of each key. The map's entry guard is held across the RocksDB write,
/// so increments of the same key serialize on the entry and the naive
/// read-then-write pattern never occurs. The persisted record is written
/// before the in-memory count advances; a failed write leaves the counter
/// unmutated.
pub struct RocksDbStore {
    db: DB,
    /// Per-key counts, loaded from the DB on first access.
    counters: DashMap<String, u64>,
}

impl RocksDbStore {
    /// Opens or creates a counter store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let parallelism = std::thread::available_parallelism()
            .map(|p| p.get() as i32)
            .unwrap_or(2);
        opts.increase_parallelism(parallelism);

        let db =
            DB::open(&opts, path.as_ref()).map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            db,
            counters: DashMap::new(),
        })
    }

    /// Storage key for a counter record.
    /// Format: cnt:{key}
    fn record_key(key: &str) -> String {
        format!("{}:{}", COUNTER_PREFIX, key)
    }

    /// Loads the persisted count for a key, treating a missing record as 0.
    fn load_count(&self, key: &str) -> Result<u64, StoreError> {
        let bytes = self
            .db
            .get(Self::record_key(key))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        match bytes {
            None => Ok(0),
            Some(bytes) => {
                let record: CounterRecord = serde_json::from_slice(&bytes).map_err(|e| {
                    StoreError::Serialization(format!(
                        "stored value for key '{}' is not a counter record: {}",
                        key, e
                    ))
                })?;
                Ok(record.count)
            }
        }
    }
}

impl CounterStore for RocksDbStore {
    fn atomic_increment(&self, key: &str) -> Result<u64, StoreError> {
        let key = validate_key(key)?;

        // The entry guard is held until the end of the scope, so a second
        // incrementer of the same key blocks here until our write is durable.
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_try_insert_with(|| self.load_count(key))?;

        let next = entry.checked_add(1).ok_or_else(|| {
            StoreError::Serialization(format!("count overflow for key '{}'", key))
        })?;

        let record = CounterRecord {
            key: key.to_string(),
            count: next,
        };
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.db
            .put(Self::record_key(key), bytes)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        // Advance the in-memory count only after the write is durable.
        *entry = next;

        tracing::debug!(key, count = next, "counter incremented");
        Ok(next)
    }

    fn get(&self, key: &str) -> Result<u64, StoreError> {
        let key = validate_key(key)?;

        if let Some(count) = self.counters.get(key) {
            return Ok(*count);
        }
        self.load_count(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksDbStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn test_first_increment_returns_one() {
        let (store, _dir) = create_test_store();
        assert_eq!(store.atomic_increment("index.html").unwrap(), 1);
    }

    #[test]
    fn test_sequential_increments_are_strictly_monotonic() {
        let (store, _dir) = create_test_store();
        for expected in 1..=50u64 {
            assert_eq!(store.atomic_increment("index.html").unwrap(), expected);
        }
        assert_eq!(store.get("index.html").unwrap(), 50);
    }

    #[test]
    fn test_keys_are_independent() {
        let (store, _dir) = create_test_store();
        store.atomic_increment("index.html").unwrap();
        store.atomic_increment("index.html").unwrap();
        assert_eq!(store.atomic_increment("about.html").unwrap(), 1);
        assert_eq!(store.get("index.html").unwrap(), 2);
    }

    #[test]
    fn test_missing_key_reads_as_zero() {
        let (store, _dir) = create_test_store();
        assert_eq!(store.get("never-touched").unwrap(), 0);
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let (store, _dir) = create_test_store();
        assert!(matches!(
            store.atomic_increment(""),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            store.atomic_increment("   "),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_key_is_trimmed_before_lookup() {
        let (store, _dir) = create_test_store();
        store.atomic_increment(" index.html ").unwrap();
        assert_eq!(store.get("index.html").unwrap(), 1);
    }

    #[test]
    fn test_counts_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            store.atomic_increment("index.html").unwrap();
            store.atomic_increment("index.html").unwrap();
        }
        let store = RocksDbStore::open(dir.path()).unwrap();
        assert_eq!(store.get("index.html").unwrap(), 2);
        assert_eq!(store.atomic_increment("index.html").unwrap(), 3);
    }

    #[test]
    fn test_corrupt_record_surfaces_serialization_error() {
        let dir = TempDir::new().unwrap();
        {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            let db = DB::open(&opts, dir.path()).unwrap();
            db.put("cnt:index.html", b"not json").unwrap();
        }
        let store = RocksDbStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.atomic_increment("index.html"),
            Err(StoreError::Serialization(_))
        ));
        // The corrupt value must never be coerced to a count.
        assert!(matches!(
            store.get("index.html"),
            Err(StoreError::Serialization(_))
        ));
    }
}
