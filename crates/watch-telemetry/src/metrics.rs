//! Prometheus metrics for the watch SDK.
//!
//! All metrics follow the naming convention: `watch_<area>_<metric>_<unit>`
//!
//! Counters are usable before [`register_metrics`] runs; registration only
//! exposes them through [`encode_metrics`].

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, Gauge, Histogram, IntCounter, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // SCHEDULER METRICS
    // =========================================================================

    /// Sync requests by outcome
    pub static ref SYNC_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("watch_sync_requests_total", "Sync requests issued by the drain loop"),
        &["outcome"]  // outcome: acknowledged/failed
    ).expect("metric creation failed");

    /// Drain cycles by phase
    pub static ref DRAIN_CYCLES: CounterVec = CounterVec::new(
        Opts::new("watch_drain_cycles_total", "Drain loop iterations"),
        &["phase"]  // phase: synced/paused/stopped
    ).expect("metric creation failed");

    /// Watch updates by outcome
    pub static ref WATCH_UPDATES: CounterVec = CounterVec::new(
        Opts::new("watch_updates_total", "Watch updates offered to the scheduler"),
        &["outcome"]  // outcome: accepted/dropped
    ).expect("metric creation failed");

    /// Buffered watch entries
    pub static ref BUFFERED_ENTRIES: Gauge = Gauge::new(
        "watch_buffered_entries",
        "Number of indices buffered by the scheduler"
    ).expect("metric creation failed");

    /// Time to settle all sync requests of one cycle
    pub static ref SYNC_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "watch_sync_duration_seconds",
            "Time spent waiting for the sync requests of one drain cycle"
        ).buckets(exponential_buckets(0.0005, 2.0, 14).unwrap_or_default())
    ).expect("metric creation failed");

    // =========================================================================
    // CONNECTION METRICS
    // =========================================================================

    /// Connection transitions
    pub static ref CONNECTION_TRANSITIONS: CounterVec = CounterVec::new(
        Opts::new("watch_connection_transitions_total", "Online/offline transitions"),
        &["state"]  // state: online/offline/error
    ).expect("metric creation failed");

    /// Inbound look pushes
    pub static ref LOOK_PUSHES: IntCounter = IntCounter::new(
        "watch_look_pushes_total",
        "Values pushed by the relay for looked indices"
    ).expect("metric creation failed");
}

/// Handle for the registered metrics
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Registering twice is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Scheduler
        Box::new(SYNC_REQUESTS.clone()),
        Box::new(DRAIN_CYCLES.clone()),
        Box::new(WATCH_UPDATES.clone()),
        Box::new(BUFFERED_ENTRIES.clone()),
        Box::new(SYNC_DURATION.clone()),
        // Connection
        Box::new(CONNECTION_TRANSITIONS.clone()),
        Box::new(LOOK_PUSHES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
