//! Metrics boundary: the cache reports, a sink records.
//!
//! Every public cache operation reports hits, misses, errors and latency to a
//! [`MetricsSink`]; the purge sweep additionally reports the resulting entry
//! count.  The default sink is [`NopMetrics`].  [`StatsSink`] keeps atomic
//! aggregate counters for tests and quick introspection, and
//! [`RecorderMetrics`] publishes everything through the global `metrics`
//! recorder so any exporter (Prometheus, statsd, ...) can pick it up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

// ---------------------------------------------------------------------------
// Method
// ---------------------------------------------------------------------------

/// The cache operation a metrics event belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Set,
    Delete,
    GetOrRefresh,
    Purge,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Set => "set",
            Method::Delete => "delete",
            Method::GetOrRefresh => "get_or_refresh",
            Method::Purge => "purge",
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsSink trait
// ---------------------------------------------------------------------------

/// Receives observability events from the cache.
///
/// All methods default to no-ops, so a sink only implements what it cares
/// about.  Implementations must be `Send + Sync + 'static`; the cache invokes
/// them from caller threads and from the background sweep thread.
pub trait MetricsSink: Send + Sync + 'static {
    /// A lookup found a valid entry.
    fn record_hit(&self, method: Method) {
        let _ = method;
    }

    /// A lookup found nothing valid (for `get_or_refresh`: a refresh ran).
    fn record_miss(&self, method: Method) {
        let _ = method;
    }

    /// A refresh function failed.
    fn record_error(&self, method: Method) {
        let _ = method;
    }

    /// Wall-clock duration of one whole operation.
    fn observe_latency(&self, method: Method, elapsed: Duration) {
        let _ = (method, elapsed);
    }

    /// Number of entries remaining after a purge sweep.
    fn report_entry_count(&self, count: usize) {
        let _ = count;
    }
}

impl<M: MetricsSink> MetricsSink for Arc<M> {
    fn record_hit(&self, method: Method) {
        (**self).record_hit(method)
    }

    fn record_miss(&self, method: Method) {
        (**self).record_miss(method)
    }

    fn record_error(&self, method: Method) {
        (**self).record_error(method)
    }

    fn observe_latency(&self, method: Method, elapsed: Duration) {
        (**self).observe_latency(method, elapsed)
    }

    fn report_entry_count(&self, count: usize) {
        (**self).report_entry_count(count)
    }
}

/// The default sink: discards everything.
pub struct NopMetrics;

impl MetricsSink for NopMetrics {}

// ---------------------------------------------------------------------------
// StatsSink
// ---------------------------------------------------------------------------

/// Atomic aggregate counters with a point-in-time [`Stats`] snapshot.
pub struct StatsSink {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl StatsSink {
    pub fn new() -> Self {
        StatsSink {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Returns a point-in-time snapshot of the counters.
    pub fn snapshot(&self) -> Stats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0_f64
        } else {
            hits as f64 / total as f64
        };
        Stats {
            hits,
            misses,
            errors,
            hit_rate,
        }
    }
}

impl Default for StatsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for StatsSink {
    fn record_hit(&self, _method: Method) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self, _method: Method) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self, _method: Method) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of [`StatsSink`] counters.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    /// Lookups that returned a valid entry.
    pub hits: u64,
    /// Lookups that found nothing valid.
    pub misses: u64,
    /// Failed refresh calls.
    pub errors: u64,
    /// `hits / (hits + misses)`, or `0.0` if no lookups have been made.
    pub hit_rate: f64,
}

impl Stats {
    pub fn request_count(&self) -> u64 {
        self.hits + self.misses
    }
}

// ---------------------------------------------------------------------------
// RecorderMetrics
// ---------------------------------------------------------------------------

/// Publishes cache metrics through the global `metrics` recorder.
///
/// Emits, under the given prefix:
/// - `<prefix>_requests_total{method, status}`: hit/miss/error counters,
/// - `<prefix>_request_duration_ms{method}`: latency histogram,
/// - `<prefix>_entries_total`: entry-count gauge updated after each sweep.
pub struct RecorderMetrics {
    requests_total: String,
    request_duration_ms: String,
    entries_total: String,
}

impl RecorderMetrics {
    pub fn new(prefix: &str) -> Self {
        RecorderMetrics {
            requests_total: format!("{prefix}_requests_total"),
            request_duration_ms: format!("{prefix}_request_duration_ms"),
            entries_total: format!("{prefix}_entries_total"),
        }
    }

    /// Registers units and help text with the installed recorder.
    pub fn describe(&self) {
        describe_counter!(
            self.requests_total.clone(),
            Unit::Count,
            "Total cache requests by method and status."
        );
        describe_histogram!(
            self.request_duration_ms.clone(),
            Unit::Milliseconds,
            "Cache request latency in milliseconds."
        );
        describe_gauge!(
            self.entries_total.clone(),
            Unit::Count,
            "Number of entries in the cache after the last purge sweep."
        );
    }
}

impl MetricsSink for RecorderMetrics {
    fn record_hit(&self, method: Method) {
        counter!(
            self.requests_total.clone(),
            "method" => method.as_str(),
            "status" => "hit"
        )
        .increment(1);
    }

    fn record_miss(&self, method: Method) {
        counter!(
            self.requests_total.clone(),
            "method" => method.as_str(),
            "status" => "miss"
        )
        .increment(1);
    }

    fn record_error(&self, method: Method) {
        counter!(
            self.requests_total.clone(),
            "method" => method.as_str(),
            "status" => "error"
        )
        .increment(1);
    }

    fn observe_latency(&self, method: Method, elapsed: Duration) {
        histogram!(self.request_duration_ms.clone(), "method" => method.as_str())
            .record(elapsed.as_secs_f64() * 1000.0);
    }

    fn report_entry_count(&self, count: usize) {
        gauge!(self.entries_total.clone()).set(count as f64);
    }
}
