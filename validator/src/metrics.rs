//! Prometheus metrics for presentation validation.
//!
//! [`ValidatorMetrics`] owns a dedicated [`Registry`]; the daemon encodes it
//! into the text exposition format on demand.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, Histogram,
    HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use rollcall_types::Outcome;

pub struct ValidatorMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Presentations by terminal outcome, labelled `outcome`.
    pub outcomes: IntCounterVec,
    /// Presentations that could not be classified because the store failed.
    pub transient_errors: IntCounter,
    /// Token rotations committed by accepted presentations. Initial
    /// issuance is not counted.
    pub rotations: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub replay_guard_entries: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// End-to-end validation time, in milliseconds.
    pub validation_latency_ms: Histogram,
}

impl ValidatorMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let outcomes = register_int_counter_vec_with_registry!(
            Opts::new(
                "rollcall_presentations_total",
                "Presentations classified, by outcome"
            ),
            &["outcome"],
            registry
        )
        .expect("failed to register outcomes counter");

        let transient_errors = register_int_counter_with_registry!(
            Opts::new(
                "rollcall_transient_errors_total",
                "Presentations aborted by a store failure or timeout"
            ),
            registry
        )
        .expect("failed to register transient_errors counter");

        let rotations = register_int_counter_with_registry!(
            Opts::new("rollcall_rotations_total", "Token rotations committed"),
            registry
        )
        .expect("failed to register rotations counter");

        let replay_guard_entries = register_int_gauge_with_registry!(
            Opts::new(
                "rollcall_replay_guard_entries",
                "Identities currently tracked by the replay guard"
            ),
            registry
        )
        .expect("failed to register replay_guard_entries gauge");

        // 0.1 ms → ~1.6 s
        let validation_latency_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "rollcall_validation_latency_ms",
                "Presentation validation time in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(0.1, 2.0, 15).unwrap()),
            registry
        )
        .expect("failed to register validation_latency_ms histogram");

        // Pre-create every label so all outcomes appear in the first scrape.
        for outcome in Outcome::ALL {
            outcomes.with_label_values(&[outcome.as_str()]);
        }

        Self {
            registry,
            outcomes,
            transient_errors,
            rotations,
            replay_guard_entries,
            validation_latency_ms,
        }
    }

    pub fn record_outcome(&self, outcome: Outcome) {
        self.outcomes.with_label_values(&[outcome.as_str()]).inc();
        if outcome == Outcome::TransientError {
            self.transient_errors.inc();
        }
    }

    pub fn outcome_count(&self, outcome: Outcome) -> u64 {
        self.outcomes.with_label_values(&[outcome.as_str()]).get()
    }

    /// Render the registry in the Prometheus text format.
    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Default for ValidatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_are_counted_per_label() {
        let metrics = ValidatorMetrics::new();
        metrics.record_outcome(Outcome::Accepted);
        metrics.record_outcome(Outcome::Accepted);
        metrics.record_outcome(Outcome::Stale);
        assert_eq!(metrics.outcome_count(Outcome::Accepted), 2);
        assert_eq!(metrics.outcome_count(Outcome::Stale), 1);
        assert_eq!(metrics.outcome_count(Outcome::Duplicate), 0);
        assert_eq!(metrics.transient_errors.get(), 0);
    }

    #[test]
    fn transient_outcome_also_bumps_error_counter() {
        let metrics = ValidatorMetrics::new();
        metrics.record_outcome(Outcome::TransientError);
        assert_eq!(metrics.transient_errors.get(), 1);
    }

    #[test]
    fn text_encoding_lists_every_outcome() {
        let metrics = ValidatorMetrics::new();
        metrics.rotations.inc();
        let text = metrics.encode_text();
        assert!(text.contains("rollcall_rotations_total 1"));
        for outcome in Outcome::ALL {
            assert!(text.contains(&format!("outcome=\"{}\"", outcome.as_str())));
        }
    }
}
