//! Per-destination latency/loss profiles.

use std::net::Ipv4Addr;

use rustc_hash::FxHashMap;

/// The delay/loss behavior simulated for one destination address.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkProfile {
    /// Median reply delay in milliseconds.
    pub median_ms: f64,
    /// Symmetric uniform spread applied around the median, in milliseconds.
    pub jitter_ms: f64,
    /// Probability in `[0, 1]` that a request gets no reply at all.
    pub loss_rate: f64,
}

impl NetworkProfile {
    /// Builds a profile from configured values.
    ///
    /// A negative median is the legacy always-drop marker from tables that
    /// predate the explicit loss column: it forces `loss_rate` to `1.0`,
    /// overriding whatever was configured. Otherwise a missing loss rate
    /// means `0.0`, and out-of-range values are clamped rather than
    /// rejected.
    pub fn new(median_ms: f64, jitter_ms: f64, loss_rate: Option<f64>) -> Self {
        let loss_rate = if median_ms < 0.0 {
            1.0
        } else {
            loss_rate.unwrap_or(0.0).clamp(0.0, 1.0)
        };

        Self { median_ms, jitter_ms: jitter_ms.max(0.0), loss_rate }
    }
}

/// Immutable mapping from destination address to its profile.
///
/// Built once at startup and shared read-only by every concurrent reply
/// task, so lookups need no synchronization.
#[derive(Debug, Clone, Default)]
pub struct ProfileTable {
    entries: FxHashMap<Ipv4Addr, NetworkProfile>,
}

impl ProfileTable {
    /// Returns the profile configured for `addr`, if any.
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<&NetworkProfile> {
        self.entries.get(&addr)
    }

    /// Inserts a profile. A later row for the same address replaces an
    /// earlier one.
    pub fn insert(&mut self, addr: Ipv4Addr, profile: NetworkProfile) {
        self.entries.insert(addr, profile);
    }

    /// Number of configured destinations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
