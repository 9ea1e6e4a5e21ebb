//! Core types for the collection store.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_millis() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Content fingerprint (SHA-256) over a stored value.
///
/// The watcher keeps fingerprints of observed event slots to detect changes
/// without retaining the full text, and the broadcaster keeps the fingerprint
/// of its own most recent publish to suppress self-delivery.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of a UTF-8 value.
    pub fn of(value: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        Fingerprint(hasher.finalize().into())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({}...)", &self.to_hex()[..8])
    }
}

/// Key into the shared substrate namespace.
///
/// Collections and event slots live in one flat namespace; consumers
/// interoperate by agreeing on the namespace tag and logical name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// Key for a named collection.
    pub fn collection(namespace: &str, name: &str) -> Self {
        StorageKey(format!("{namespace}.{name}"))
    }

    /// Key for an event slot.
    pub fn event(namespace: &str, event_name: &str) -> Self {
        StorageKey(format!("{namespace}.event.{event_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({})", self.0)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A change notification as persisted in an event slot.
///
/// Transient: each publish replaces the previous event for that name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Event name.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event-specific payload.
    pub data: serde_json::Value,

    /// When the event was published.
    pub timestamp: Timestamp,
}

impl ChangeEvent {
    /// Build an event stamped with the current time.
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: Timestamp::now(),
        }
    }
}
