use serde::{Deserialize, Serialize};

use crate::contracts::error::StoreError;

/// Durable per-key visit counters.
///
/// # Invariants
/// - INV-1: One record per distinct key once touched; no duplicates
/// - INV-2: Counts are monotonically non-decreasing - advanced only by
///   `atomic_increment`, never overwritten with an arbitrary value
/// - INV-3: Increments on the same key are serialized by the store - N
///   concurrent increments yield N distinct sequential totals, no lost
///   updates
/// - INV-4: Unseen keys have an implicit count of 0; the first increment
///   returns 1 and creates the record on demand
pub trait CounterStore: Send + Sync {
    /// Atomically adds 1 to the counter for `key` and returns the new total.
    ///
    /// The read-modify-write is a single indivisible operation with respect
    /// to concurrent callers on the same key; no intermediate state is
    /// observable. Either the count advances by exactly 1 and the new total
    /// is returned, or the store is left unmutated and an error is returned.
    fn atomic_increment(&self, key: &str) -> Result<u64, StoreError>;

    /// Returns the current count for `key` without mutating it.
    /// Keys with no record read as 0.
    fn get(&self, key: &str) -> Result<u64, StoreError>;
}

/// One counter row as persisted in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    /// Stable identifier of the counted resource (e.g. a page path).
    pub key: String,
    /// Cumulative number of increments observed for `key`.
    pub count: u64,
}

/// Validates a counter key, returning it trimmed of surrounding whitespace.
///
/// A key that is empty (or trims to empty) is rejected with `InvalidKey`.
pub fn validate_key(key: &str) -> Result<&str, StoreError> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidKey(
            "key must be a non-empty string".into(),
        ));
    }
    Ok(trimmed)
}
