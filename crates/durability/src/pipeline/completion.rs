//! One-shot completion signal
//!
//! Resolved exactly once with the pipeline outcome. Any number of clones
//! may wait on it; each receives its own copy of the outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::state::PipelineOutcome;

struct Slot {
    outcome: Mutex<Option<PipelineOutcome>>,
    ready: Condvar,
}

/// Cloneable handle to a pipeline's eventual outcome.
#[derive(Clone)]
pub struct Completion {
    slot: Arc<Slot>,
}

impl Completion {
    pub(crate) fn new() -> Self {
        Completion {
            slot: Arc::new(Slot {
                outcome: Mutex::new(None),
                ready: Condvar::new(),
            }),
        }
    }

    /// Store the outcome and wake all waiters. Later calls are ignored.
    pub(crate) fn resolve(&self, outcome: PipelineOutcome) -> bool {
        let mut slot = self.slot.outcome.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        self.slot.ready.notify_all();
        true
    }

    /// Whether the outcome is available.
    pub fn is_resolved(&self) -> bool {
        self.slot.outcome.lock().is_some()
    }

    /// The outcome, if already resolved.
    pub fn try_outcome(&self) -> Option<PipelineOutcome> {
        self.slot.outcome.lock().clone()
    }

    /// Block until resolved.
    pub fn wait(&self) -> PipelineOutcome {
        let mut slot = self.slot.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            self.slot.ready.wait(&mut slot);
        }
    }

    /// Block until resolved or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<PipelineOutcome> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return Some(outcome.clone());
            }
            if self.slot.ready.wait_until(&mut slot, deadline).timed_out() {
                return slot.clone();
            }
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
