//! Metrics collection for AgentLoop
//!
//! This module provides Prometheus metrics for observability.
//! Counters are cheap atomics; nothing here blocks the request path.

use lazy_static::lazy_static;
use prometheus::{Histogram, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics registry for AgentLoop
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub assignment: AssignmentMetrics,
    pub model: ModelMetrics,
    pub fanout: FanoutMetrics,
}

/// Coordinator assignment metrics
#[derive(Debug, Clone)]
pub struct AssignmentMetrics {
    /// Total number of assignment attempts
    pub requests_total: IntCounter,

    /// Assignments that picked an agent
    pub assigned_total: IntCounter,

    /// Attempts where no agent was eligible
    pub no_agent_available: IntCounter,

    /// Reservations lost to a concurrent assignment
    pub reservation_conflicts: IntCounter,

    /// Assignment duration histogram (includes model calls)
    pub duration: Histogram,
}

/// Language model call metrics
#[derive(Debug, Clone)]
pub struct ModelMetrics {
    /// Total number of model calls
    pub calls_total: IntCounter,

    /// Model calls that failed and were replaced by a fallback
    pub fallbacks_total: IntCounter,

    /// Model call latency
    pub call_duration: Histogram,
}

/// Connection fan-out metrics
#[derive(Debug, Clone)]
pub struct FanoutMetrics {
    /// Currently connected client channels
    pub active_connections: IntGauge,

    /// Messages broadcast
    pub broadcasts_total: IntCounter,

    /// Channels evicted after a failed delivery
    pub evictions_total: IntCounter,

    /// Simulator ticks that ran
    pub simulator_ticks: IntCounter,
}

lazy_static! {
    /// Global metrics registry instance
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("valid counter definition");
    registry
        .register(Box::new(counter.clone()))
        .expect("counter registered once");
    counter
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    let gauge = IntGauge::new(name, help).expect("valid gauge definition");
    registry
        .register(Box::new(gauge.clone()))
        .expect("gauge registered once");
    gauge
}

fn histogram(registry: &Registry, name: &str, help: &str, buckets: Vec<f64>) -> Histogram {
    let opts = prometheus::HistogramOpts::new(name, help).buckets(buckets);
    let histogram = Histogram::with_opts(opts).expect("valid histogram definition");
    registry
        .register(Box::new(histogram.clone()))
        .expect("histogram registered once");
    histogram
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let assignment = AssignmentMetrics {
            requests_total: counter(
                &registry,
                "assignment_requests_total",
                "Total number of task assignment attempts",
            ),
            assigned_total: counter(
                &registry,
                "assignment_assigned_total",
                "Total number of tasks assigned to an agent",
            ),
            no_agent_available: counter(
                &registry,
                "assignment_no_agent_available_total",
                "Assignment attempts with no eligible agent",
            ),
            reservation_conflicts: counter(
                &registry,
                "assignment_reservation_conflicts_total",
                "Capacity reservations lost to a concurrent assignment",
            ),
            duration: histogram(
                &registry,
                "assignment_duration_seconds",
                "End-to-end assignment duration in seconds",
                vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            ),
        };

        let model = ModelMetrics {
            calls_total: counter(
                &registry,
                "model_calls_total",
                "Total number of language model calls",
            ),
            fallbacks_total: counter(
                &registry,
                "model_fallbacks_total",
                "Model calls that failed and were replaced by a fallback",
            ),
            call_duration: histogram(
                &registry,
                "model_call_duration_seconds",
                "Language model call latency in seconds",
                vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            ),
        };

        let fanout = FanoutMetrics {
            active_connections: gauge(
                &registry,
                "fanout_active_connections",
                "Current number of connected client channels",
            ),
            broadcasts_total: counter(
                &registry,
                "fanout_broadcasts_total",
                "Total number of broadcasts",
            ),
            evictions_total: counter(
                &registry,
                "fanout_evictions_total",
                "Channels evicted after a failed delivery",
            ),
            simulator_ticks: counter(
                &registry,
                "simulator_ticks_total",
                "Activity simulator ticks that ran",
            ),
        };

        MetricsRegistry {
            registry,
            assignment,
            model,
            fanout,
        }
    }

    /// Gather all metrics as text
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper for timing async work against a histogram
pub struct LatencyTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl LatencyTimer {
    /// Start timing
    pub fn start(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
