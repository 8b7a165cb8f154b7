//! Global atomic counters for promotion activity.
//!
//! Call [`Metrics::flush`] at natural boundaries (end of a CLI invocation)
//! to emit the current values as one `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::Outcome;

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    evaluations: AtomicU64,
    allowed: AtomicU64,
    blocked: AtomicU64,
    publish_retries: AtomicU64,
    rollbacks_attempted: AtomicU64,
    rollbacks_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            evaluations: AtomicU64::new(0),
            allowed: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            publish_retries: AtomicU64::new(0),
            rollbacks_attempted: AtomicU64::new(0),
            rollbacks_failed: AtomicU64::new(0),
        }
    }

    /// Count one finished evaluation and its outcome.
    pub fn record_decision(&self, outcome: Outcome) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Outcome::Allow => self.allowed.fetch_add(1, Ordering::Relaxed),
            Outcome::Block => self.blocked.fetch_add(1, Ordering::Relaxed),
        };
        tracing::trace!(metric = "evaluations", outcome = %outcome, "counter incremented");
    }

    pub fn inc_publish_retries(&self) {
        self.publish_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "publish_retries", "counter incremented");
    }

    pub fn inc_rollbacks_attempted(&self) {
        self.rollbacks_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rollbacks_failed(&self) {
        self.rollbacks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            evaluations = self.evaluations(),
            allowed = self.allowed(),
            blocked = self.blocked(),
            publish_retries = self.publish_retries(),
            rollbacks_attempted = self.rollbacks_attempted(),
            rollbacks_failed = self.rollbacks_failed(),
        );
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn allowed(&self) -> u64 {
        self.allowed.load(Ordering::Relaxed)
    }

    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    pub fn publish_retries(&self) -> u64 {
        self.publish_retries.load(Ordering::Relaxed)
    }

    pub fn rollbacks_attempted(&self) -> u64 {
        self.rollbacks_attempted.load(Ordering::Relaxed)
    }

    pub fn rollbacks_failed(&self) -> u64 {
        self.rollbacks_failed.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn reset(&self) {
        for counter in [
            &self.evaluations,
            &self.allowed,
            &self.blocked,
            &self.publish_retries,
            &self.rollbacks_attempted,
            &self.rollbacks_failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
