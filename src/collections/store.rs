//! Collection store implementation.

use crate::error::{Result, StoreError};
use crate::substrate::Substrate;
use crate::types::StorageKey;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

/// Generic CRUD over named collections persisted on a [`Substrate`].
///
/// Reads absorb absent or malformed data into a caller-supplied default.
/// Mutations surface their failures as [`StoreError`] and serialize
/// read-modify-write sequences through a per-collection lock plus the
/// substrate's own exclusion, so concurrent appenders cannot clobber each
/// other's writes.
pub struct CollectionStore {
    namespace: String,
    substrate: Arc<dyn Substrate>,

    /// Per-collection locks serializing in-process mutations.
    mutation_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CollectionStore {
    pub fn new(namespace: impl Into<String>, substrate: Arc<dyn Substrate>) -> Self {
        Self {
            namespace: namespace.into(),
            substrate,
            mutation_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Read a collection, falling back to `default` when the collection has
    /// never been written or its stored content fails to parse.
    ///
    /// Never raises; substrate and parse failures are logged and treated as
    /// absent data.
    pub fn read<T: DeserializeOwned>(&self, name: &str, default: Vec<T>) -> Vec<T> {
        let raw = match self.substrate.get(&self.key(name)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return default,
            Err(err) => {
                warn!(collection = name, error = %err, "substrate read failed, using default");
                return default;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(items) => items,
            Err(err) => {
                warn!(collection = name, error = %err, "stored collection is malformed, using default");
                default
            }
        }
    }

    /// Replace the whole collection with `items`.
    ///
    /// Every record must be a JSON object carrying a string `id`, and ids
    /// must be unique within the collection.
    pub fn write<T: Serialize>(&self, name: &str, items: &[T]) -> Result<()> {
        let values = items
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.check_ids(name, &values)?;
        self.store_raw(name, &values)
    }

    /// Append one record, rejecting a duplicate id.
    pub fn append<T: Serialize>(&self, name: &str, item: &T) -> Result<()> {
        let value = serde_json::to_value(item)?;
        let id = record_id(&value)
            .ok_or_else(|| StoreError::MissingId {
                collection: name.to_string(),
            })?
            .to_string();

        let lock = self.collection_lock(name);
        let _local = lock.lock();
        let _exclusive = self.substrate.lock_exclusive()?;

        let mut values = self.read_values(name);
        if values.iter().any(|v| record_id(v) == Some(id.as_str())) {
            return Err(StoreError::DuplicateId {
                collection: name.to_string(),
                id,
            });
        }

        values.push(value);
        self.store_raw(name, &values)
    }

    /// Shallow-merge `patch` into the first record whose id equals `id`.
    ///
    /// Returns `Ok(false)` when no record matches; the collection is left
    /// unchanged. `patch` must be a JSON object. A patch may rename the
    /// record through its `id` key, but only to a string id no other record
    /// holds, so id uniqueness survives updates.
    pub fn update_by_id(&self, name: &str, id: &str, patch: &Value) -> Result<bool> {
        let patch = patch
            .as_object()
            .ok_or_else(|| StoreError::InvalidPatch("patch must be a JSON object".to_string()))?;

        let lock = self.collection_lock(name);
        let _local = lock.lock();
        let _exclusive = self.substrate.lock_exclusive()?;

        let mut values = self.read_values(name);
        let Some(position) = values.iter().position(|v| record_id(v) == Some(id)) else {
            return Ok(false);
        };

        if let Some(patched_id) = patch.get("id") {
            let Some(patched_id) = patched_id.as_str() else {
                return Err(StoreError::InvalidPatch(
                    "patch `id` must be a string".to_string(),
                ));
            };
            if patched_id != id && values.iter().any(|v| record_id(v) == Some(patched_id)) {
                return Err(StoreError::DuplicateId {
                    collection: name.to_string(),
                    id: patched_id.to_string(),
                });
            }
        }

        // record_id only matches JSON objects, so this always succeeds
        if let Some(fields) = values[position].as_object_mut() {
            for (key, value) in patch {
                fields.insert(key.clone(), value.clone());
            }
        }

        self.store_raw(name, &values)?;
        Ok(true)
    }

    /// Remove the first record whose id equals `id`.
    ///
    /// Returns `Ok(false)` when no record matches.
    pub fn delete_by_id(&self, name: &str, id: &str) -> Result<bool> {
        let lock = self.collection_lock(name);
        let _local = lock.lock();
        let _exclusive = self.substrate.lock_exclusive()?;

        let mut values = self.read_values(name);
        let Some(position) = values.iter().position(|v| record_id(v) == Some(id)) else {
            return Ok(false);
        };

        values.remove(position);
        self.store_raw(name, &values)?;
        Ok(true)
    }

    fn key(&self, name: &str) -> StorageKey {
        StorageKey::collection(&self.namespace, name)
    }

    /// Read the raw array for mutation, treating malformed data as absent.
    fn read_values(&self, name: &str) -> Vec<Value> {
        self.read(name, Vec::new())
    }

    fn store_raw(&self, name: &str, values: &[Value]) -> Result<()> {
        let raw = serde_json::to_string(values)?;
        self.substrate.set(&self.key(name), &raw)
    }

    fn check_ids(&self, name: &str, values: &[Value]) -> Result<()> {
        let mut seen = HashSet::new();
        for value in values {
            let id = record_id(value).ok_or_else(|| StoreError::MissingId {
                collection: name.to_string(),
            })?;
            if !seen.insert(id.to_string()) {
                return Err(StoreError::DuplicateId {
                    collection: name.to_string(),
                    id: id.to_string(),
                });
            }
        }
        Ok(())
    }

    fn collection_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.mutation_locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

/// Extract the string `id` of a record, if it is an object that carries one.
fn record_id(value: &Value) -> Option<&str> {
    value.get("id")?.as_str()
}
