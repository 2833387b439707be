//! Thread-safe latency and throughput metrics.
//!
//! The replay worker is the only writer; the HTTP collaborator reads
//! percentiles, counters, throughput and the last error at any time.
//! Counters are relaxed atomics (monotonicity is the only requirement);
//! latency samples and the last-error string sit behind separate mutexes so
//! percentile reads never serialize against error propagation.
//!
//! Percentiles use the nearest-rank method: for n sorted samples,
//! `p(q) = samples[min(floor(n * q), n - 1)]`, with p50 at index `n / 2`.
//! No interpolation.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

/// Default p99 spike threshold (10 ms).
pub const DEFAULT_P99_THRESHOLD_NS: u64 = 10_000_000;

/// Metrics collector for a replay run.
#[derive(Debug, Default)]
pub struct Metrics {
    /// MBO records dispatched to a book model
    pub total_messages: AtomicU64,
    /// Malformed or failed record decodes
    pub decode_errors: AtomicU64,
    /// Failures that terminated a replay
    pub replay_errors: AtomicU64,
    /// Total elapsed replay wall-clock, written once at end of replay
    replay_duration_ns: AtomicU64,

    // Streaming counters, driven by the HTTP collaborator.
    total_connections: AtomicU64,
    total_events_streamed: AtomicU64,
    connected_clients: AtomicI64,
    peak_concurrent_clients: AtomicI64,

    latencies: Mutex<Vec<u64>>,
    last_error: Mutex<String>,
}

impl Metrics {
    /// Create an empty metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one per-message latency sample.
    pub fn record_latency(&self, ns: u64) {
        self.latencies
            .lock()
            .expect("latency mutex poisoned")
            .push(ns);
    }

    /// Number of recorded latency samples.
    pub fn sample_count(&self) -> usize {
        self.latencies.lock().expect("latency mutex poisoned").len()
    }

    /// Store the message of the failure that terminated the replay.
    pub fn set_last_error(&self, msg: impl Into<String>) {
        *self.last_error.lock().expect("error mutex poisoned") = msg.into();
    }

    /// The last stored error message (empty when none).
    pub fn last_error(&self) -> String {
        self.last_error.lock().expect("error mutex poisoned").clone()
    }

    /// Stamp the total replay duration. Written once at end of replay.
    pub fn set_replay_duration_ns(&self, ns: u64) {
        self.replay_duration_ns.store(ns, Ordering::Relaxed);
    }

    /// Total replay duration in nanoseconds (0 until a replay finishes).
    pub fn replay_duration_ns(&self) -> u64 {
        self.replay_duration_ns.load(Ordering::Relaxed)
    }

    fn sorted_samples(&self) -> Vec<u64> {
        let mut copy = self
            .latencies
            .lock()
            .expect("latency mutex poisoned")
            .clone();
        copy.sort_unstable();
        copy
    }

    /// Median latency: sorted sample at index `n / 2`.
    pub fn p50(&self) -> f64 {
        let copy = self.sorted_samples();
        if copy.is_empty() {
            return 0.0;
        }
        copy[copy.len() / 2] as f64
    }

    /// 95th percentile latency (nearest-rank).
    pub fn p95(&self) -> f64 {
        self.percentile(0.95)
    }

    /// 99th percentile latency (nearest-rank).
    pub fn p99(&self) -> f64 {
        self.percentile(0.99)
    }

    fn percentile(&self, q: f64) -> f64 {
        let copy = self.sorted_samples();
        if copy.is_empty() {
            return 0.0;
        }
        let idx = ((copy.len() as f64 * q) as usize).min(copy.len() - 1);
        copy[idx] as f64
    }

    /// Messages per second over the recorded replay duration; 0 when the
    /// duration has not been stamped.
    pub fn throughput_msg_per_sec(&self) -> f64 {
        let duration_ns = self.replay_duration_ns();
        if duration_ns == 0 {
            return 0.0;
        }
        self.total_messages.load(Ordering::Relaxed) as f64 / (duration_ns as f64 / 1e9)
    }

    /// Whether p99 latency strictly exceeds the threshold.
    pub fn p99_exceeds(&self, threshold_ns: u64) -> bool {
        self.p99() > threshold_ns as f64
    }

    /// Register a new stream client: bumps the live gauge and the total,
    /// and advances the peak watermark.
    pub fn client_connected(&self) {
        let current = self.connected_clients.fetch_add(1, Ordering::Relaxed) + 1;
        self.total_connections.fetch_add(1, Ordering::Relaxed);

        let mut peak = self.peak_concurrent_clients.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_concurrent_clients.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => peak = observed,
            }
        }
    }

    /// Unregister a stream client.
    pub fn client_disconnected(&self) {
        self.connected_clients.fetch_sub(1, Ordering::Relaxed);
    }

    /// Count one streamed event.
    pub fn event_streamed(&self) {
        self.total_events_streamed.fetch_add(1, Ordering::Relaxed);
    }

    /// Currently connected stream clients.
    pub fn connected_clients(&self) -> i64 {
        self.connected_clients.load(Ordering::Relaxed)
    }

    /// Highest observed concurrent client count.
    pub fn peak_concurrent_clients(&self) -> i64 {
        self.peak_concurrent_clients.load(Ordering::Relaxed)
    }

    /// Total stream connections over the run.
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Total events pushed to stream clients.
    pub fn total_events_streamed(&self) -> u64 {
        self.total_events_streamed.load(Ordering::Relaxed)
    }

    /// Point-in-time view for the metrics endpoint.
    pub fn snapshot(&self, p99_threshold_ns: u64) -> MetricsSnapshot {
        let p99 = self.p99();
        MetricsSnapshot {
            connected_clients: self.connected_clients(),
            peak_concurrent_clients: self.peak_concurrent_clients(),
            total_connections: self.total_connections(),
            total_events_streamed: self.total_events_streamed(),
            total_messages: self.total_messages.load(Ordering::Relaxed),
            replay_errors: self.replay_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            latency_ns_p50: self.p50(),
            latency_ns_p95: self.p95(),
            latency_ns_p99: p99,
            throughput_msg_per_sec: self.throughput_msg_per_sec(),
            p99_threshold_ns,
            latency_spike: p99 > p99_threshold_ns as f64,
            last_error: self.last_error(),
        }
    }
}

/// Serializable snapshot of all metrics, shaped for the `/metrics` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub connected_clients: i64,
    pub peak_concurrent_clients: i64,
    pub total_connections: u64,
    pub total_events_streamed: u64,
    pub total_messages: u64,
    pub replay_errors: u64,
    pub decode_errors: u64,
    pub latency_ns_p50: f64,
    pub latency_ns_p95: f64,
    pub latency_ns_p99: f64,
    pub throughput_msg_per_sec: f64,
    pub p99_threshold_ns: u64,
    pub latency_spike: bool,
    pub last_error: String,
}
