//! Single-slot, versioned hand-off between the message path and the render loop.
//!
//! Publishing overwrites whatever is in the slot; the reader only ever sees the
//! newest payload. Intermediate payloads are dropped, never queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct Mailbox {
    version: AtomicU64,
    slot: Mutex<Option<(u64, Arc<String>)>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `payload` as the newest snapshot and return its version (starting at 1).
    pub fn publish(&self, payload: String) -> u64 {
        let mut slot = match self.slot.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        *slot = Some((version, Arc::new(payload)));
        version
    }

    /// Version of the newest published payload; 0 before the first publish.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// The newest payload if its version is greater than `last_seen`.
    pub fn take_newer(&self, last_seen: u64) -> Option<(u64, Arc<String>)> {
        if self.version() <= last_seen {
            return None;
        }
        let slot = match self.slot.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.as_ref()
            .filter(|(v, _)| *v > last_seen)
            .map(|(v, p)| (*v, Arc::clone(p)))
    }

    /// Newest payload regardless of version.
    pub fn latest(&self) -> Option<(u64, Arc<String>)> {
        self.take_newer(0)
    }
}
