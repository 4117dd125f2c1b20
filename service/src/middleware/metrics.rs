//! Dispatch metrics for a router.
//!
//! Tracks:
//! - Dispatch outcomes (success, substitution, chain exhaustion)
//! - Transport aborts and tier fallbacks
//! - Per-model attempt/failure breakdown
//! - Latency

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::ModelId;

/// Point-in-time view of the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MetricsSnapshot {
    pub dispatches_total: u64,
    pub dispatches_succeeded: u64,
    /// Successes served by a chain substitute rather than the tier's model.
    pub substitutions: u64,
    pub chains_exhausted: u64,
    pub transport_aborts: u64,
    pub tier_fallbacks: u64,
    pub latency_avg_ms: u64,
}

/// Attempts against one concrete model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ModelMetrics {
    pub model_id: String,
    pub attempts: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct ModelCounters {
    attempts: AtomicU64,
    failures: AtomicU64,
}

/// Lock-free counters plus a per-model breakdown.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    dispatches_total: AtomicU64,
    dispatches_succeeded: AtomicU64,
    substitutions: AtomicU64,
    chains_exhausted: AtomicU64,
    transport_aborts: AtomicU64,
    tier_fallbacks: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,

    per_model: RwLock<HashMap<String, ModelCounters>>,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// One caller request, however many tiers it ends up trying.
    pub fn record_dispatch(&self) {
        self.dispatches_total.fetch_add(1, Ordering::Relaxed);
    }

    /// One attempt against `model`, successful or not.
    pub fn record_attempt(&self, model: &ModelId, failed: bool) {
        self.with_model(model, |counters| {
            counters.attempts.fetch_add(1, Ordering::Relaxed);
            if failed {
                counters.failures.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    pub fn record_success(&self, substituted: bool, latency: Duration) {
        self.dispatches_succeeded.fetch_add(1, Ordering::Relaxed);
        if substituted {
            self.substitutions.fetch_add(1, Ordering::Relaxed);
        }
        self.record_latency(latency);
    }

    pub fn record_exhausted(&self, latency: Duration) {
        self.chains_exhausted.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_transport_abort(&self) {
        self.transport_aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tier_fallback(&self) {
        self.tier_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency_sum = self.latency_sum_ms.load(Ordering::Relaxed);
        let latency_count = self.latency_count.load(Ordering::Relaxed);

        MetricsSnapshot {
            dispatches_total: self.dispatches_total.load(Ordering::Relaxed),
            dispatches_succeeded: self.dispatches_succeeded.load(Ordering::Relaxed),
            substitutions: self.substitutions.load(Ordering::Relaxed),
            chains_exhausted: self.chains_exhausted.load(Ordering::Relaxed),
            transport_aborts: self.transport_aborts.load(Ordering::Relaxed),
            tier_fallbacks: self.tier_fallbacks.load(Ordering::Relaxed),
            latency_avg_ms: latency_sum.checked_div(latency_count).unwrap_or(0),
        }
    }

    /// Per-model breakdown, sorted by model id.
    pub fn model_metrics(&self) -> Vec<ModelMetrics> {
        let per_model = self.per_model.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<ModelMetrics> = per_model
            .iter()
            .map(|(model_id, counters)| ModelMetrics {
                model_id: model_id.clone(),
                attempts: counters.attempts.load(Ordering::Relaxed),
                failures: counters.failures.load(Ordering::Relaxed),
            })
            .collect();
        out.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        out
    }

    /// Total attempts across all models.
    pub fn attempts_total(&self) -> u64 {
        self.model_metrics().iter().map(|m| m.attempts).sum()
    }

    pub fn reset(&self) {
        self.dispatches_total.store(0, Ordering::Relaxed);
        self.dispatches_succeeded.store(0, Ordering::Relaxed);
        self.substitutions.store(0, Ordering::Relaxed);
        self.chains_exhausted.store(0, Ordering::Relaxed);
        self.transport_aborts.store(0, Ordering::Relaxed);
        self.tier_fallbacks.store(0, Ordering::Relaxed);
        self.latency_sum_ms.store(0, Ordering::Relaxed);
        self.latency_count.store(0, Ordering::Relaxed);
        self.per_model
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record_latency(&self, latency: Duration) {
        self.latency_sum_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    fn with_model(&self, model: &ModelId, f: impl Fn(&ModelCounters)) {
        {
            let per_model = self.per_model.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(counters) = per_model.get(model.as_str()) {
                f(counters);
                return;
            }
        }
        let mut per_model = self.per_model.write().unwrap_or_else(PoisonError::into_inner);
        f(per_model.entry(model.to_string()).or_default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_dispatch_outcomes() {
        let metrics = DispatchMetrics::new();
        let a = ModelId::new("p/a");
        let b = ModelId::new("p/b");

        metrics.record_dispatch();
        metrics.record_attempt(&a, true);
        metrics.record_attempt(&b, false);
        metrics.record_success(true, Duration::from_millis(200));

        metrics.record_dispatch();
        metrics.record_attempt(&a, true);
        metrics.record_exhausted(Duration::from_millis(100));

        metrics.record_dispatch();
        metrics.record_transport_abort();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.dispatches_total, 3);
        assert_eq!(snapshot.dispatches_succeeded, 1);
        assert_eq!(snapshot.substitutions, 1);
        assert_eq!(snapshot.chains_exhausted, 1);
        assert_eq!(snapshot.transport_aborts, 1);
        assert_eq!(snapshot.latency_avg_ms, 150);

        let per_model = metrics.model_metrics();
        assert_eq!(per_model.len(), 2);
        assert_eq!(per_model[0].model_id, "p/a");
        assert_eq!(per_model[0].attempts, 2);
        assert_eq!(per_model[0].failures, 2);
        assert_eq!(per_model[1].failures, 0);
        assert_eq!(metrics.attempts_total(), 3);
    }

    #[test]
    fn reset_clears_everything() {
        let metrics = DispatchMetrics::new();
        metrics.record_dispatch();
        metrics.record_attempt(&ModelId::new("p/a"), false);
        metrics.record_tier_fallback();
        metrics.reset();

        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
        assert!(metrics.model_metrics().is_empty());
    }
}
