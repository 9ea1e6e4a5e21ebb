//! In-memory substrate.

use super::{MutationGuard, Substrate};
use crate::error::Result;
use crate::types::StorageKey;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

/// Process-local substrate backed by a hash map.
///
/// Useful for tests and for callers that want a store with no persistence.
/// Cross-process delivery never fires on this backend; there is no other
/// process to share it with.
pub struct MemorySubstrate {
    slots: RwLock<HashMap<String, String>>,
    mutation_lock: Mutex<()>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            mutation_lock: Mutex::new(()),
        }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

impl Default for MemorySubstrate {
    fn default() -> Self {
        Self::new()
    }
}

impl Substrate for MemorySubstrate {
    fn get(&self, key: &StorageKey) -> Result<Option<String>> {
        Ok(self.slots.read().get(key.as_str()).cloned())
    }

    fn set(&self, key: &StorageKey, value: &str) -> Result<()> {
        self.slots
            .write()
            .insert(key.as_str().to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> Result<()> {
        self.slots.write().remove(key.as_str());
        Ok(())
    }

    fn lock_exclusive(&self) -> Result<MutationGuard<'_>> {
        Ok(MutationGuard::process(self.mutation_lock.lock()))
    }
}
