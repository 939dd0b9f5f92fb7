//! Global atomic counters for feedback loop observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at daemon shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters with no allocation or locking.
pub struct Metrics {
    feedback_received: AtomicU64,
    updates_applied: AtomicU64,
    feedback_denied: AtomicU64,
    update_failures: AtomicU64,
    trainings: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// All counters start at zero.
    pub const fn new() -> Self {
        Self {
            feedback_received: AtomicU64::new(0),
            updates_applied: AtomicU64::new(0),
            feedback_denied: AtomicU64::new(0),
            update_failures: AtomicU64::new(0),
            trainings: AtomicU64::new(0),
        }
    }

    /// Increment the feedback-received counter by one.
    pub fn inc_feedback_received(&self) {
        self.feedback_received.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "feedback_received", "counter incremented");
    }

    /// Increment the updates-applied counter by one.
    pub fn inc_updates_applied(&self) {
        self.updates_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "updates_applied", "counter incremented");
    }

    /// Increment the feedback-denied counter by one.
    pub fn inc_feedback_denied(&self) {
        self.feedback_denied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "feedback_denied", "counter incremented");
    }

    /// Increment the update-failures counter by one.
    pub fn inc_update_failures(&self) {
        self.update_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "update_failures", "counter incremented");
    }

    /// Increment the trainings counter by one.
    pub fn inc_trainings(&self) {
        self.trainings.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "trainings", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a `process` run, daemon
    /// shutdown) rather than on every increment. Counters are not reset.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            feedback_received = self.feedback_received(),
            updates_applied = self.updates_applied(),
            feedback_denied = self.feedback_denied(),
            update_failures = self.update_failures(),
            trainings = self.trainings(),
        );
    }

    /// Read the current feedback-received count.
    pub fn feedback_received(&self) -> u64 {
        self.feedback_received.load(Ordering::Relaxed)
    }

    /// Read the current updates-applied count.
    pub fn updates_applied(&self) -> u64 {
        self.updates_applied.load(Ordering::Relaxed)
    }

    /// Read the current feedback-denied count.
    pub fn feedback_denied(&self) -> u64 {
        self.feedback_denied.load(Ordering::Relaxed)
    }

    /// Read the current update-failures count.
    pub fn update_failures(&self) -> u64 {
        self.update_failures.load(Ordering::Relaxed)
    }

    /// Read the current trainings count.
    pub fn trainings(&self) -> u64 {
        self.trainings.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.feedback_received,
            &self.updates_applied,
            &self.feedback_denied,
            &self.update_failures,
            &self.trainings,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
