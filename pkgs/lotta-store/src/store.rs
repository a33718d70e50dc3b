//! The normalized store contract
//!
//! A normalized store keeps every entity exactly once under its own key and
//! lets several views reference it. Views are plain JSON values; the typed
//! helpers in [`StoreExt`] convert them through serde.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;
use crate::key::{identify_value, Entity, StoreKey};

/// Updater passed to [`NormalizedStore::modify`]
///
/// Receives the current value (if any) and returns the value to keep.
/// Returning `None` removes the entry.
pub type Updater<'a> = dyn FnMut(Option<Value>) -> Result<Option<Value>, StoreError> + 'a;

/// One write in a batch
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    Put(StoreKey, Value),
    Evict(StoreKey),
}

impl StoreOp {
    pub fn key(&self) -> &StoreKey {
        match self {
            StoreOp::Put(key, _) | StoreOp::Evict(key) => key,
        }
    }
}

/// Key/value contract shared by every cache backend
pub trait NormalizedStore: Send + Sync {
    fn read(&self, key: &StoreKey) -> Result<Option<Value>, StoreError>;

    fn write(&self, key: StoreKey, value: Value) -> Result<(), StoreError>;

    /// Read-compute-write on a single key, atomic with respect to every
    /// other call on the same store. Returns whether the key existed.
    fn modify(&self, key: &StoreKey, updater: &mut Updater<'_>) -> Result<bool, StoreError>;

    /// Remove an entry. Returns whether it existed.
    fn evict(&self, key: &StoreKey) -> Result<bool, StoreError>;

    fn identify(&self, value: &Value) -> Option<StoreKey> {
        identify_value(value)
    }

    /// Apply a batch of writes.
    ///
    /// Backends without a multi-key primitive apply the ops in order; a
    /// failure leaves the earlier ops applied.
    fn apply(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        for op in ops {
            match op {
                StoreOp::Put(key, value) => self.write(key, value)?,
                StoreOp::Evict(key) => {
                    self.evict(&key)?;
                }
            }
        }
        Ok(())
    }

    /// Every entry, sorted by key
    fn snapshot(&self) -> Result<Vec<(StoreKey, Value)>, StoreError>;

    /// Load entries, overwriting keys that already exist
    fn restore(&self, entries: Vec<(StoreKey, Value)>) -> Result<(), StoreError> {
        self.apply(
            entries
                .into_iter()
                .map(|(key, value)| StoreOp::Put(key, value))
                .collect(),
        )
    }
}

/// Typed access on top of any [`NormalizedStore`]
pub trait StoreExt: NormalizedStore {
    fn read_as<T: DeserializeOwned>(&self, key: &StoreKey) -> Result<Option<T>, StoreError> {
        match self.read(key)? {
            Some(value) => decode(key, value).map(Some),
            None => Ok(None),
        }
    }

    fn write_as<T: Serialize>(&self, key: StoreKey, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.write(key, value)
    }

    fn modify_as<T, F>(&self, key: &StoreKey, mut updater: F) -> Result<bool, StoreError>
    where
        T: DeserializeOwned + Serialize,
        F: FnMut(Option<T>) -> Result<Option<T>, StoreError>,
    {
        self.modify(key, &mut |current| {
            let typed = match current {
                Some(value) => Some(decode::<T>(key, value)?),
                None => None,
            };
            match updater(typed)? {
                Some(next) => Ok(Some(serde_json::to_value(next)?)),
                None => Ok(None),
            }
        })
    }
}

impl<S: NormalizedStore + ?Sized> StoreExt for S {}

/// Serialize a typed value into a batch op
pub fn put<T: Serialize>(key: StoreKey, value: &T) -> Result<StoreOp, StoreError> {
    Ok(StoreOp::Put(key, serde_json::to_value(value)?))
}

/// Serialize an entity under its own key, tagged with `__typename` so
/// [`NormalizedStore::identify`] recognises the stored value
pub fn put_entity<E: Entity + Serialize>(entity: &E) -> Result<StoreOp, StoreError> {
    let mut value = serde_json::to_value(entity)?;
    if let Value::Object(object) = &mut value {
        object.insert(
            "__typename".to_string(),
            Value::String(E::TYPENAME.to_string()),
        );
    }
    Ok(StoreOp::Put(StoreKey::of(entity), value))
}

fn decode<T: DeserializeOwned>(key: &StoreKey, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::TypeMismatch {
        key: key.clone(),
        reason: e.to_string(),
    })
}
