use dashmap::DashMap;

use crate::contracts::{validate_key, CounterStore, StoreError};

/// In-process counter store.
///
/// Backs the mock-service test harness and local development; counts do not
/// survive a restart. Same contract as the durable store: the map's entry
/// API serializes increments per key.
#[derive(Default)]
pub struct MemoryStore {
    counters: DashMap<String, u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys that have been touched. Harness introspection only.
    pub fn record_count(&self) -> usize {
        self.counters.len()
    }
}

impl CounterStore for MemoryStore {
    fn atomic_increment(&self, key: &str) -> Result<u64, StoreError> {
        let key = validate_key(key)?;

        let mut entry = self.counters.entry(key.to_string()).or_insert(0);
        let next = entry.checked_add(1).ok_or_else(|| {
            StoreError::Serialization(format!("count overflow for key '{}'", key))
        })?;
        *entry = next;

        Ok(next)
    }

    fn get(&self, key: &str) -> Result<u64, StoreError> {
        let key = validate_key(key)?;
        Ok(self.counters.get(key).map(|c| *c).unwrap_or(0))
    }
}
