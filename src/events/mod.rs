//! Change broadcasting: typed events fanned out to subscribers.
//!
//! Publishing an event persists it under a well-known slot and synchronously
//! invokes every same-process subscriber in registration order. A background
//! watcher polls the slots other processes write to and relays their events
//! to local subscribers, best-effort and unordered across processes.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe("message_sent", |payload| {
//!     println!("message: {payload}");
//! });
//!
//! store.publish("message_sent", json!({"id": "m1"}))?;
//!
//! handle.unsubscribe();
//! ```

mod broadcaster;
mod watcher;

pub use broadcaster::{Broadcaster, SubscriptionHandle, SubscriptionId};
