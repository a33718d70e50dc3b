//! In-memory normalized store

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::StoreError;
use crate::key::StoreKey;
use crate::store::{NormalizedStore, StoreOp, Updater};

/// Process-wide cache shared by every view
///
/// Cloning yields another handle to the same entries. Every call takes the
/// lock once, so a batch passed to [`NormalizedStore::apply`] is observed
/// either entirely or not at all.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<StoreKey, Value>>>,
    revision: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed writes since creation
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, key: &StoreKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Drop every entry
    pub fn reset(&self) {
        self.entries.write().clear();
        self.bump();
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }
}

impl NormalizedStore for MemoryStore {
    fn read(&self, key: &StoreKey) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, key: StoreKey, value: Value) -> Result<(), StoreError> {
        debug!("write {}", key);
        self.entries.write().insert(key, value);
        self.bump();
        Ok(())
    }

    fn modify(&self, key: &StoreKey, updater: &mut Updater<'_>) -> Result<bool, StoreError> {
        let mut entries = self.entries.write();
        let current = entries.get(key).cloned();
        let existed = current.is_some();

        match updater(current)? {
            Some(next) => {
                entries.insert(key.clone(), next);
            }
            None => {
                entries.remove(key);
            }
        }
        drop(entries);

        debug!("modify {} (existed: {})", key, existed);
        self.bump();
        Ok(existed)
    }

    fn evict(&self, key: &StoreKey) -> Result<bool, StoreError> {
        let removed = self.entries.write().remove(key).is_some();
        if removed {
            debug!("evict {}", key);
            self.bump();
        }
        Ok(removed)
    }

    fn apply(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        if ops.is_empty() {
            return Ok(());
        }

        let count = ops.len();
        let mut entries = self.entries.write();
        for op in ops {
            match op {
                StoreOp::Put(key, value) => {
                    entries.insert(key, value);
                }
                StoreOp::Evict(key) => {
                    entries.remove(&key);
                }
            }
        }
        drop(entries);

        debug!("applied batch of {} ops", count);
        self.bump();
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<(StoreKey, Value)>, StoreError> {
        let mut entries: Vec<(StoreKey, Value)> = self
            .entries
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}
