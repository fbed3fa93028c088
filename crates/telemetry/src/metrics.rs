//! Internal metrics collection.
//!
//! Counters and histograms are plain atomics in a process-wide registry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Histogram for latency tracking.
#[derive(Debug, Default)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / count as f64
        }
    }

    /// Returns (upper bound, count) pairs.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the score engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Chat ingestion
    pub chat_messages_received: Counter,
    pub votes_extracted: Counter,
    pub votes_discarded: Counter,

    // Persistence
    pub votes_persisted: Counter,
    pub batch_writes: Counter,
    pub batch_write_errors: Counter,
    pub aggregations: Counter,

    // Lifecycle
    pub metadata_errors: Counter,
    pub sessions_started: Counter,
    pub sessions_ended: Counter,
    pub finalization_attempts: Counter,
    pub finalizations_completed: Counter,
    pub finalizations_incomplete: Counter,

    // Latency
    pub store_latency_ms: Histogram,
    pub metadata_latency_ms: Histogram,

    // Gauges
    pub pending_votes: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub chat_messages_received: u64,
    pub votes_extracted: u64,
    pub votes_discarded: u64,
    pub votes_persisted: u64,
    pub batch_write_errors: u64,
    pub metadata_errors: u64,
    pub sessions_started: u64,
    pub sessions_ended: u64,
    pub finalization_attempts: u64,
    pub pending_votes: u64,
    pub store_latency_mean_ms: f64,
    pub metadata_latency_mean_ms: f64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            chat_messages_received: self.chat_messages_received.get(),
            votes_extracted: self.votes_extracted.get(),
            votes_discarded: self.votes_discarded.get(),
            votes_persisted: self.votes_persisted.get(),
            batch_write_errors: self.batch_write_errors.get(),
            metadata_errors: self.metadata_errors.get(),
            sessions_started: self.sessions_started.get(),
            sessions_ended: self.sessions_ended.get(),
            finalization_attempts: self.finalization_attempts.get(),
            pending_votes: self.pending_votes.get(),
            store_latency_mean_ms: self.store_latency_ms.mean(),
            metadata_latency_mean_ms: self.metadata_latency_ms.mean(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
