//! Key-value substrate underlying collections and event slots.
//!
//! The substrate is a flat, shared namespace of UTF-8 text values keyed by
//! string. Collections are isolated only by key-naming convention; any code
//! holding the substrate can read or overwrite any slot. Two backends are
//! provided:
//!
//! - [`MemorySubstrate`]: process-local, for tests and throwaway stores
//! - [`FileSubstrate`]: one file per key under a root directory, shared
//!   across processes

mod file;
mod memory;

pub use file::FileSubstrate;
pub use memory::MemorySubstrate;

use crate::error::Result;
use crate::types::StorageKey;
use fs2::FileExt;

/// Flat namespace of UTF-8 text values.
pub trait Substrate: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &StorageKey) -> Result<Option<String>>;

    /// Replace the whole value under `key` in a single operation.
    ///
    /// Readers must never observe a partial write.
    fn set(&self, key: &StorageKey, value: &str) -> Result<()>;

    /// Remove the value under `key`. No-op if absent.
    fn remove(&self, key: &StorageKey) -> Result<()>;

    /// Serialize read-modify-write sequences against other writers of this
    /// substrate. The exclusion is released when the guard drops.
    fn lock_exclusive(&self) -> Result<MutationGuard<'_>>;
}

/// Guard holding a substrate-level mutation lock.
pub struct MutationGuard<'a> {
    inner: GuardInner<'a>,
}

enum GuardInner<'a> {
    /// In-process exclusion only.
    Process(parking_lot::MutexGuard<'a, ()>),
    /// Advisory file lock, excluding writers in other processes too.
    File(std::fs::File),
}

impl<'a> MutationGuard<'a> {
    /// Guard backed by an in-process mutex.
    pub fn process(guard: parking_lot::MutexGuard<'a, ()>) -> Self {
        Self {
            inner: GuardInner::Process(guard),
        }
    }

    /// Guard backed by an exclusive advisory lock on `file`.
    pub fn file(file: std::fs::File) -> Self {
        Self {
            inner: GuardInner::File(file),
        }
    }
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        if let GuardInner::File(file) = &self.inner {
            let _ = file.unlock();
        }
    }
}
