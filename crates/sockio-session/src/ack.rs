//! Correlation of outbound acknowledged requests with their replies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Per-session table of callers waiting for an `AckResponse`.
///
/// Ids increase monotonically from zero and are never reused within a
/// session. Each entry is removed exactly once, by whichever of reply,
/// timeout, send failure or shutdown comes first.
pub struct AckRegistry {
    next_id: AtomicU64,
    waiters: Mutex<HashMap<u64, oneshot::Sender<String>>>,
}

impl AckRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate an id and register a waiter for it.
    pub fn register(&self) -> (u64, oneshot::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let _ = self.waiters.lock().insert(id, tx);
        (id, rx)
    }

    /// Deliver raw reply args to the waiter for `id`.
    ///
    /// Returns `false` when nobody is waiting, either because the id is
    /// unknown or because the caller already gave up.
    pub fn resolve(&self, id: u64, args: String) -> bool {
        let Some(tx) = self.waiters.lock().remove(&id) else {
            return false;
        };
        tx.send(args).is_ok()
    }

    /// Forget the waiter for `id`. Removing twice is a no-op.
    pub fn remove(&self, id: u64) -> bool {
        self.waiters.lock().remove(&id).is_some()
    }

    /// Drop every waiter so pending callers observe a closed session.
    /// Returns how many were pending.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.waiters.lock().drain().collect();
        drained.len()
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Whether no requests are outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AckRegistry {
    fn default() -> Self {
        Self::new()
    }
}
