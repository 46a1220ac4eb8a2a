//! Run counters for the simulation engine.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the dispatcher, the reply tasks and the
/// periodic summary.
#[derive(Debug, Default)]
pub struct SimStats {
    /// Echo requests accepted by the dispatcher.
    received: AtomicU64,
    /// Replies handed to the packet I/O layer.
    replied: AtomicU64,
    /// Requests dropped by the loss model.
    dropped: AtomicU64,
    /// Replies that failed to transmit.
    failed: AtomicU64,
}

impl SimStats {
    #[inline]
    pub(crate) fn increment_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_replied(&self) {
        self.replied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn replied(&self) -> u64 {
        self.replied.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
