//! Shutdown coordination.
//!
//! The signal handler flips [`ShutdownState`]; accept loops and the event
//! loop poll it between turns so a message already being processed always
//! runs to completion.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared shutdown flags, cheap to clone into every task.
#[derive(Debug, Clone, Default)]
pub struct ShutdownState {
    /// Set once: listeners stop accepting, the event loop drains and exits
    shutdown_initiated: Arc<AtomicBool>,
    /// Set by the event loop once its queue is drained
    shutdown_complete: Arc<AtomicBool>,
    /// Number of shutdown requests seen so far
    requests: Arc<AtomicUsize>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.shutdown_complete.load(Ordering::Acquire)
    }

    /// Requests shutdown and returns how many requests have been made,
    /// including this one.
    pub fn initiate_shutdown(&self) -> usize {
        let count = self.requests.fetch_add(1, Ordering::AcqRel) + 1;
        if !self.shutdown_initiated.swap(true, Ordering::AcqRel) {
            info!("🛑 Shutdown initiated - listeners closing, pending messages will drain");
        }
        count
    }

    /// Marks the event loop as drained.
    pub fn complete_shutdown(&self) {
        self.shutdown_complete.store(true, Ordering::Release);
        info!("✅ Event loop drained - ready for final cleanup");
    }
}
