//! Generic CRUD over named, persisted collections.
//!
//! A collection is an ordered JSON array of records stored as one blob under
//! a namespaced key. Records are opaque apart from a string `id` field, the
//! unit of update and delete. Every mutation re-serializes the whole array;
//! write cost is bounded by collection size, which is expected to stay small.

mod store;

pub use store::CollectionStore;
