//! Atomic counters for engine observability.
//!
//! All counters use relaxed ordering. They are diagnostic only and never
//! used for synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::evaluator::{Reason, Verdict};

/// Engine operation counters. One instance per store.
#[derive(Debug)]
pub struct EngineMetrics {
    /// Total evaluations performed.
    pub evaluations: AtomicU64,
    pub pin_matches: AtomicU64,
    pub pin_mismatches: AtomicU64,
    pub not_pinned: AtomicU64,
    pub bypassed: AtomicU64,
    /// Requests with an empty hostname or no observed hashes.
    pub malformed_requests: AtomicU64,
    /// Evaluations that used builtin pins instead of the remote policy.
    pub builtin_fallbacks: AtomicU64,
    pub refreshes_applied: AtomicU64,
    /// Refreshes discarded for parse, schema or rollback errors.
    pub refreshes_rejected: AtomicU64,
    pub reverts: AtomicU64,
}

impl EngineMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            evaluations: AtomicU64::new(0),
            pin_matches: AtomicU64::new(0),
            pin_mismatches: AtomicU64::new(0),
            not_pinned: AtomicU64::new(0),
            bypassed: AtomicU64::new(0),
            malformed_requests: AtomicU64::new(0),
            builtin_fallbacks: AtomicU64::new(0),
            refreshes_applied: AtomicU64::new(0),
            refreshes_rejected: AtomicU64::new(0),
            reverts: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Count one finished evaluation.
    pub fn record_verdict(&self, verdict: Verdict, reason: Reason) {
        Self::inc(&self.evaluations);
        Self::inc(match verdict {
            Verdict::PinMatch => &self.pin_matches,
            Verdict::PinMismatch => &self.pin_mismatches,
            Verdict::NotPinned => &self.not_pinned,
            Verdict::Bypassed => &self.bypassed,
        });
        if reason == Reason::MalformedRequest {
            Self::inc(&self.malformed_requests);
        }
    }

    /// Snapshot all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            evaluations: Self::get(&self.evaluations),
            pin_matches: Self::get(&self.pin_matches),
            pin_mismatches: Self::get(&self.pin_mismatches),
            not_pinned: Self::get(&self.not_pinned),
            bypassed: Self::get(&self.bypassed),
            malformed_requests: Self::get(&self.malformed_requests),
            builtin_fallbacks: Self::get(&self.builtin_fallbacks),
            refreshes_applied: Self::get(&self.refreshes_applied),
            refreshes_rejected: Self::get(&self.refreshes_rejected),
            reverts: Self::get(&self.reverts),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub evaluations: u64,
    pub pin_matches: u64,
    pub pin_mismatches: u64,
    pub not_pinned: u64,
    pub bypassed: u64,
    pub malformed_requests: u64,
    pub builtin_fallbacks: u64,
    pub refreshes_applied: u64,
    pub refreshes_rejected: u64,
    pub reverts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let m = EngineMetrics::new();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn record_verdict_buckets_by_outcome() {
        let m = EngineMetrics::new();
        m.record_verdict(Verdict::PinMatch, Reason::Matched);
        m.record_verdict(Verdict::PinMismatch, Reason::NoPinMatch);
        m.record_verdict(Verdict::NotPinned, Reason::MalformedRequest);
        EngineMetrics::inc(&m.refreshes_rejected);
        let snap = m.snapshot();
        assert_eq!(snap.evaluations, 3);
        assert_eq!(snap.pin_matches, 1);
        assert_eq!(snap.pin_mismatches, 1);
        assert_eq!(snap.not_pinned, 1);
        assert_eq!(snap.malformed_requests, 1);
        assert_eq!(snap.refreshes_rejected, 1);
        assert_eq!(snap.bypassed, 0);
    }
}
