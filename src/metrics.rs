// Observability collaborator handed to the timer engine.
//
// Implementations decide where observations go; nothing here is global.
// The production implementation registers its families with a caller-owned
// prometheus `Registry`, which `GET /api/metrics` renders as text.

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Buckets for closed time entries, in seconds (1m .. 8h).
pub const DURATION_BUCKETS: &[f64] =
    &[60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 14400.0, 28800.0];

pub trait Metrics: Send + Sync {
    /// Count one occurrence of `name` with the given outcome tag ("ok" or an error code).
    fn increment(&self, name: &'static str, outcome: &'static str);

    fn observe_seconds(&self, name: &'static str, value: i64);
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

/// Counters and histograms backed by a prometheus registry.
#[derive(Clone)]
pub struct PrometheusMetrics {
    operations: CounterVec,
    durations: HistogramVec,
}

impl PrometheusMetrics {
    pub fn new(registry: &Registry) -> Result<Self, MetricsError> {
        let operations = CounterVec::new(
            Opts::new("taskflow_timer_operations_total", "Timer operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations.clone()))?;

        let durations = HistogramVec::new(
            HistogramOpts::new("taskflow_time_entry_seconds", "Length of closed time entries")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["name"],
        )?;
        registry.register(Box::new(durations.clone()))?;

        Ok(Self { operations, durations })
    }
}

impl Metrics for PrometheusMetrics {
    fn increment(&self, name: &'static str, outcome: &'static str) {
        self.operations.with_label_values(&[name, outcome]).inc();
    }

    fn observe_seconds(&self, name: &'static str, value: i64) {
        self.durations.with_label_values(&[name]).observe(value as f64);
    }
}

/// Renders every family in `registry` in the prometheus text format.
pub fn encode_text(registry: &Registry) -> Result<String, MetricsError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| MetricsError::Encoding(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
}

#[cfg(test)]
pub mod recording {
    use std::sync::Mutex;

    use super::Metrics;

    /// Keeps every observation in memory for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingMetrics {
        pub counters: Mutex<Vec<(&'static str, &'static str)>>,
        pub observations: Mutex<Vec<(&'static str, i64)>>,
    }

    impl RecordingMetrics {
        pub fn count(&self, name: &str, outcome: &str) -> usize {
            self.counters
                .lock()
                .unwrap()
                .iter()
                .filter(|(n, o)| *n == name && *o == outcome)
                .count()
        }
    }

    impl Metrics for RecordingMetrics {
        fn increment(&self, name: &'static str, outcome: &'static str) {
            self.counters.lock().unwrap().push((name, outcome));
        }

        fn observe_seconds(&self, name: &'static str, value: i64) {
            self.observations.lock().unwrap().push((name, value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_durations_are_exported() {
        let registry = Registry::new();
        let metrics = PrometheusMetrics::new(&registry).unwrap();

        metrics.increment("timer.start", "ok");
        metrics.increment("timer.start", "ok");
        metrics.increment("timer.start", "conflict_active_timer");
        metrics.observe_seconds("timer.duration", 3661);

        assert_eq!(metrics.operations.with_label_values(&["timer.start", "ok"]).get(), 2.0);
        assert_eq!(
            metrics
                .operations
                .with_label_values(&["timer.start", "conflict_active_timer"])
                .get(),
            1.0
        );
        let histogram = metrics.durations.with_label_values(&["timer.duration"]);
        assert_eq!(histogram.get_sample_count(), 1);
        assert_eq!(histogram.get_sample_sum(), 3661.0);

        let text = encode_text(&registry).unwrap();
        assert!(text.contains("taskflow_timer_operations_total"));
        assert!(text.contains("taskflow_time_entry_seconds_count"));
    }

    #[test]
    fn registering_twice_on_one_registry_fails() {
        let registry = Registry::new();
        PrometheusMetrics::new(&registry).unwrap();
        assert!(matches!(
            PrometheusMetrics::new(&registry),
            Err(MetricsError::Registration(_))
        ));
    }
}
