//! Cluster metrics for monitoring and observability.
//!
//! Mirrors the teacher's own atomics-based counters rather than wiring
//! the `prometheus` crate's registry directly — see DESIGN.md.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-lifetime counters for one [`crate::cluster::Cluster`]
/// instance.
#[derive(Default)]
pub struct ClusterMetrics {
    pins_total: AtomicU64,
    unpins_total: AtomicU64,
    pin_errors_total: AtomicU64,
    broadcasts_total: AtomicU64,
    broadcast_failures_total: AtomicU64,
    peer_adds_total: AtomicU64,
    peer_removes_total: AtomicU64,
}

impl ClusterMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pin(&self) {
        self.pins_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unpin(&self) {
        self.unpins_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pin_error(&self) {
        self.pin_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self, failures: u64) {
        self.broadcasts_total.fetch_add(1, Ordering::Relaxed);
        self.broadcast_failures_total.fetch_add(failures, Ordering::Relaxed);
    }

    pub fn record_peer_add(&self) {
        self.peer_adds_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_remove(&self) {
        self.peer_removes_total.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> ClusterMetricsSnapshot {
        ClusterMetricsSnapshot {
            pins_total: self.pins_total.load(Ordering::Relaxed),
            unpins_total: self.unpins_total.load(Ordering::Relaxed),
            pin_errors_total: self.pin_errors_total.load(Ordering::Relaxed),
            broadcasts_total: self.broadcasts_total.load(Ordering::Relaxed),
            broadcast_failures_total: self.broadcast_failures_total.load(Ordering::Relaxed),
            peer_adds_total: self.peer_adds_total.load(Ordering::Relaxed),
            peer_removes_total: self.peer_removes_total.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of [`ClusterMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterMetricsSnapshot {
    pub pins_total: u64,
    pub unpins_total: u64,
    pub pin_errors_total: u64,
    pub broadcasts_total: u64,
    pub broadcast_failures_total: u64,
    pub peer_adds_total: u64,
    pub peer_removes_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let m = ClusterMetrics::new();
        assert_eq!(m.snapshot().pins_total, 0);
    }

    #[test]
    fn record_pin_increments_counter() {
        let m = ClusterMetrics::new();
        m.record_pin();
        m.record_pin();
        assert_eq!(m.snapshot().pins_total, 2);
    }

    #[test]
    fn record_broadcast_tracks_failure_count() {
        let m = ClusterMetrics::new();
        m.record_broadcast(2);
        m.record_broadcast(0);
        let snap = m.snapshot();
        assert_eq!(snap.broadcasts_total, 2);
        assert_eq!(snap.broadcast_failures_total, 2);
    }
}
