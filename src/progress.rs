//! Progress observers invoked by the storage backends and the batch pipeline.

use std::sync::atomic::{AtomicU64, Ordering};

/// Receives byte and item deltas. Every callback defaults to a no-op.
pub trait Progress: Send + Sync {
    /// Called after a chunk of `delta` bytes was read or written.
    fn on_bytes(&self, _delta: u64) {}

    /// Called when `delta` items reached a terminal state.
    fn on_item(&self, _delta: u64) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {}

/// Keeps running totals.
#[derive(Debug, Default)]
pub struct CountingProgress {
    bytes: AtomicU64,
    items: AtomicU64,
}

impl CountingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn items(&self) -> u64 {
        self.items.load(Ordering::Relaxed)
    }
}

impl Progress for CountingProgress {
    fn on_bytes(&self, delta: u64) {
        self.bytes.fetch_add(delta, Ordering::Relaxed);
    }

    fn on_item(&self, delta: u64) {
        let done = self.items.fetch_add(delta, Ordering::Relaxed) + delta;
        tracing::debug!(items = done, bytes = self.bytes(), "progress");
    }
}
