//! Single-slot handoff between execution contexts.

use std::sync::{Mutex, MutexGuard};
use tracing::trace;

/// Holds at most one `(key, value)` pair, newest wins.
///
/// Producers overwrite; a consumer takes the pair out in one step, so two
/// consumers racing on `take_and_clear` never both see the same value.
#[derive(Debug)]
pub struct Mailbox<K, V> {
    slot: Mutex<Option<(K, V)>>,
}

impl<K, V> Default for Mailbox<K, V> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<K, V> Mailbox<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the slot half-written.
    fn slot(&self) -> MutexGuard<'_, Option<(K, V)>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a pair, replacing whatever was there
    pub fn save(&self, key: K, value: V) {
        let replaced = self.slot().replace((key, value)).is_some();
        trace!(replaced, "Mailbox saved");
    }

    /// Remove and return the current pair
    pub fn take_and_clear(&self) -> Option<(K, V)> {
        self.slot().take()
    }

    pub fn clear(&self) {
        self.slot().take();
    }

    pub fn is_empty(&self) -> bool {
        self.slot().is_none()
    }
}

impl<K: Clone, V: Clone> Mailbox<K, V> {
    /// Read the current pair without clearing it. Meant for diagnostics only.
    pub fn peek(&self) -> Option<(K, V)> {
        self.slot().clone()
    }
}
