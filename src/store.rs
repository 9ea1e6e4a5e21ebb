//! Main Store struct tying the data layer together.

use crate::collections::CollectionStore;
use crate::error::Result;
use crate::events::{Broadcaster, SubscriptionHandle};
use crate::substrate::{FileSubstrate, MemorySubstrate, Substrate};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Root directory for the file substrate.
    pub path: PathBuf,

    /// Namespace tag prefixed onto every storage key. All processes that
    /// should interoperate must agree on it.
    pub namespace: String,

    /// How often the watcher polls for events from other processes.
    pub poll_interval: Duration,

    /// Whether to run the cross-process watcher at all.
    pub watch: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./satchel"),
            namespace: "app".to_string(),
            poll_interval: Duration::from_millis(200),
            watch: true,
        }
    }
}

/// The data layer handle: named persisted collections plus change
/// broadcasting over one shared substrate.
///
/// Construct one at application start and pass it by reference; the crate
/// keeps no global state. Two stores opened on the same path (from the same
/// or different processes) see each other's collections, and their watchers
/// relay each other's events.
pub struct Store {
    config: StoreConfig,
    collections: CollectionStore,
    broadcaster: Broadcaster,
}

impl Store {
    /// Open a file-backed store as described by `config`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let substrate: Arc<dyn Substrate> = Arc::new(FileSubstrate::open(&config.path)?);
        Self::with_substrate(config, substrate)
    }

    /// Open a throwaway in-memory store. No persistence, no watcher.
    pub fn in_memory() -> Result<Self> {
        let config = StoreConfig {
            watch: false,
            ..StoreConfig::default()
        };
        Self::with_substrate(config, Arc::new(MemorySubstrate::new()))
    }

    /// Open a store over an explicit substrate.
    pub fn with_substrate(config: StoreConfig, substrate: Arc<dyn Substrate>) -> Result<Self> {
        let collections = CollectionStore::new(config.namespace.clone(), substrate.clone());
        let poll_interval = config.watch.then_some(config.poll_interval);
        let broadcaster = Broadcaster::new(config.namespace.clone(), substrate, poll_interval)?;

        Ok(Self {
            config,
            collections,
            broadcaster,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The collection CRUD layer.
    pub fn collections(&self) -> &CollectionStore {
        &self.collections
    }

    /// The event layer.
    pub fn events(&self) -> &Broadcaster {
        &self.broadcaster
    }

    // --- Collection operations ---

    /// Read a collection, falling back to `default` when absent or malformed.
    pub fn read<T: DeserializeOwned>(&self, name: &str, default: Vec<T>) -> Vec<T> {
        self.collections.read(name, default)
    }

    /// Replace the whole collection.
    pub fn write<T: Serialize>(&self, name: &str, items: &[T]) -> Result<()> {
        self.collections.write(name, items)
    }

    /// Append one record.
    pub fn append<T: Serialize>(&self, name: &str, item: &T) -> Result<()> {
        self.collections.append(name, item)
    }

    /// Shallow-merge `patch` into the record with `id`. `Ok(false)` if absent.
    pub fn update_by_id(&self, name: &str, id: &str, patch: &Value) -> Result<bool> {
        self.collections.update_by_id(name, id, patch)
    }

    /// Remove the record with `id`. `Ok(false)` if absent.
    pub fn delete_by_id(&self, name: &str, id: &str) -> Result<bool> {
        self.collections.delete_by_id(name, id)
    }

    // --- Event operations ---

    /// Publish `payload` under `event` to all subscribers, here and in other
    /// processes sharing the substrate.
    pub fn publish(&self, event: &str, payload: Value) -> Result<()> {
        self.broadcaster.publish(event, payload)
    }

    /// Subscribe to future publishes of `event`.
    pub fn subscribe<F>(&self, event: &str, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.broadcaster.subscribe(event, callback)
    }
}
