//! Cross-process event watcher.

use super::broadcaster::SubscriberRegistry;
use crate::error::Result;
use crate::substrate::Substrate;
use crate::types::{ChangeEvent, Fingerprint, StorageKey};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Polls event slots for changes made by other processes and relays them to
/// local subscribers.
///
/// Delivery is best-effort: rapid publishes that land between two polls
/// coalesce into one observed change, and nothing is replayed after a
/// restart. The slot written by this process's own broadcaster is skipped.
pub(crate) struct Watcher {
    shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Watcher {
    pub(crate) fn spawn(
        namespace: String,
        substrate: Arc<dyn Substrate>,
        registry: Arc<SubscriberRegistry>,
        own_writes: Arc<Mutex<HashMap<String, Fingerprint>>>,
        interval: Duration,
    ) -> Result<Self> {
        let (shutdown, receiver) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("satchel-watcher".to_string())
            .spawn(move || {
                debug!("watcher started");
                // None records a slot observed absent; a value appearing
                // later is then a genuine change, not pre-existing state.
                let mut last_seen: HashMap<String, Option<Fingerprint>> = HashMap::new();

                loop {
                    match receiver.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    for event in registry.watched_events() {
                        poll_slot(
                            &namespace,
                            substrate.as_ref(),
                            &registry,
                            &own_writes,
                            &mut last_seen,
                            &event,
                        );
                    }
                }
                debug!("watcher stopped");
            })?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        let _ = self.shutdown.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Check one event slot and dispatch if another process changed it.
fn poll_slot(
    namespace: &str,
    substrate: &dyn Substrate,
    registry: &SubscriberRegistry,
    own_writes: &Mutex<HashMap<String, Fingerprint>>,
    last_seen: &mut HashMap<String, Option<Fingerprint>>,
    event: &str,
) {
    let key = StorageKey::event(namespace, event);
    let value = match substrate.get(&key) {
        Ok(value) => value,
        Err(err) => {
            warn!(event, error = %err, "watcher poll failed");
            return;
        }
    };

    let fingerprint = value.as_deref().map(Fingerprint::of);
    let previous = last_seen.insert(event.to_string(), fingerprint);

    let (Some(raw), Some(fingerprint)) = (value, fingerprint) else {
        return;
    };

    match previous {
        // First sighting: remember the slot but do not replay an event
        // published before we started watching.
        None => return,
        Some(previous) if previous == Some(fingerprint) => return,
        Some(_) => {}
    }

    // The writing process does not hear its own write.
    if own_writes.lock().get(event) == Some(&fingerprint) {
        return;
    }

    let envelope: ChangeEvent = match serde_json::from_str(&raw) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(event, error = %err, "malformed event slot, skipping");
            return;
        }
    };

    // A panicking subscriber must not kill delivery for everyone else.
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        registry.dispatch(event, &envelope.data);
    }));
    if outcome.is_err() {
        warn!(event, "subscriber panicked during cross-process dispatch");
    }
}
