//! Callbacks waiting for the boundary to signal readiness.

use std::fmt;

use crate::host::IsolationBoundary;

/// Deferred work against the live boundary.
pub type ReadyCallback = Box<dyn FnOnce(&mut dyn IsolationBoundary) + Send>;

/// Ordered queue, drained once per run.
#[derive(Default)]
pub struct PendingReady {
    callbacks: Vec<ReadyCallback>,
}

impl PendingReady {
    pub fn push(&mut self, callback: ReadyCallback) {
        self.callbacks.push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Run every callback in registration order, leaving the queue empty.
    pub fn drain_into(&mut self, boundary: &mut dyn IsolationBoundary) -> usize {
        let callbacks = std::mem::take(&mut self.callbacks);
        let count = callbacks.len();
        for callback in callbacks {
            callback(boundary);
        }
        count
    }

    /// Drop everything without running it.
    pub fn clear(&mut self) {
        self.callbacks.clear();
    }
}

impl fmt::Debug for PendingReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReady")
            .field("len", &self.callbacks.len())
            .finish()
    }
}
