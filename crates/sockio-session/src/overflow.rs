//! Sessions currently above the outbound backpressure threshold.
//!
//! Purely observational: nothing in the engine reads the set back to make
//! decisions.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tracing::debug;

use crate::metrics::{OVERFLOW_MARKS_TOTAL, OVERFLOW_SESSIONS};

/// Receives backpressure transitions from send loops.
pub trait OverflowSink: Send + Sync {
    /// The session's outbound queue is more than half full.
    fn mark(&self, session: u64);

    /// The session's outbound queue drained below the threshold, or the
    /// session ended.
    fn clear(&self, session: u64);
}

/// Lock-guarded set of session keys.
#[derive(Default)]
pub struct OverflowSet {
    members: Mutex<HashSet<u64>>,
}

static GLOBAL: OnceLock<Arc<OverflowSet>> = OnceLock::new();

impl OverflowSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide set used when a session is given no sink of its own.
    pub fn global() -> Arc<OverflowSet> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(OverflowSet::new())))
    }

    /// Whether `session` is currently marked.
    pub fn contains(&self, session: u64) -> bool {
        self.members.lock().contains(&session)
    }

    /// Number of marked sessions.
    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    /// Whether no session is marked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_size(len: usize) {
    gauge!(OVERFLOW_SESSIONS).set(len as f64);
}

impl OverflowSink for OverflowSet {
    fn mark(&self, session: u64) {
        let mut members = self.members.lock();
        if members.insert(session) {
            debug!(session, "outbound queue above half capacity");
            counter!(OVERFLOW_MARKS_TOTAL).increment(1);
            record_size(members.len());
        }
    }

    fn clear(&self, session: u64) {
        let mut members = self.members.lock();
        if members.remove(&session) {
            debug!(session, "outbound queue back under threshold");
            record_size(members.len());
        }
    }
}
