//! # Satchel
//!
//! A persisted-collection store with cross-process change broadcasting: the
//! data layer for local-first applications that keep their state in a shared
//! key-value substrate instead of a backend service.
//!
//! ## Core Concepts
//!
//! - **Collections**: named, ordered JSON arrays of records, each record an
//!   object with a unique string `id`
//! - **Substrate**: the shared flat namespace holding collections and event
//!   slots (files on disk, or memory for tests)
//! - **Change events**: named notifications fanned out synchronously to
//!   same-process subscribers and, best-effort, to other processes
//!
//! ## Example
//!
//! ```ignore
//! use satchel::{Store, StoreConfig};
//! use serde_json::json;
//!
//! let store = Store::open(StoreConfig {
//!     path: "./my-app-data".into(),
//!     namespace: "my_app".into(),
//!     ..Default::default()
//! })?;
//!
//! store.append("messages", &json!({"id": "m1", "text": "hi"}))?;
//!
//! let handle = store.subscribe("message_sent", |payload| {
//!     println!("heard: {payload}");
//! });
//! store.publish("message_sent", json!({"id": "m1"}))?;
//! handle.unsubscribe();
//! ```

pub mod collections;
pub mod error;
pub mod events;
pub mod store;
pub mod substrate;
pub mod types;

// Re-exports
pub use collections::CollectionStore;
pub use error::{Result, StoreError};
pub use events::{Broadcaster, SubscriptionHandle, SubscriptionId};
pub use store::{Store, StoreConfig};
pub use substrate::{FileSubstrate, MemorySubstrate, MutationGuard, Substrate};
pub use types::{ChangeEvent, Fingerprint, StorageKey, Timestamp};
