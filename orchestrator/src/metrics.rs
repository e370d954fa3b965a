use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::gesture::GestureTag;

/// Upper bounds (ms) of the latency histogram buckets
pub const LATENCY_BUCKETS_MS: [f64; 10] = [
    50.0, 100.0, 200.0, 400.0, 800.0, 1200.0, 2000.0, 3000.0, 5000.0, 8000.0,
];

/// Write-only destination for per-turn measurements
pub trait MetricsSink: Send + Sync {
    fn record_request(&self);
    fn record_error(&self);
    /// Inference failures, a subset of errors
    fn record_backend_failure(&self);
    fn record_slo_miss(&self);
    fn observe_inference_ms(&self, ms: f64);
    fn observe_e2e_ms(&self, ms: f64);
    fn record_gesture(&self, tag: &GestureTag);
}

/// Fixed-bucket histogram; the last slot counts values above every bound
#[derive(Debug)]
pub struct Histogram {
    bounds: &'static [f64],
    counts: Vec<AtomicU64>,
    total: AtomicU64,
    sum_micros: AtomicU64,
}

impl Histogram {
    pub fn new(bounds: &'static [f64]) -> Self {
        Self {
            bounds,
            counts: (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect(),
            total: AtomicU64::new(0),
            sum_micros: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, ms: f64) {
        let ms = if ms.is_finite() { ms.max(0.0) } else { 0.0 };
        let slot = self
            .bounds
            .iter()
            .position(|bound| ms <= *bound)
            .unwrap_or(self.bounds.len());
        self.counts[slot].fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((ms * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let counts: Vec<u64> = self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect();
        let count = self.total.load(Ordering::Relaxed);
        let sum_ms = self.sum_micros.load(Ordering::Relaxed) as f64 / 1000.0;
        let buckets = self
            .bounds
            .iter()
            .map(|bound| format!("le_{}", bound))
            .chain(std::iter::once("le_inf".to_string()))
            .zip(counts)
            .collect();

        HistogramSnapshot {
            count,
            sum_ms,
            mean_ms: if count == 0 { 0.0 } else { sum_ms / count as f64 },
            buckets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum_ms: f64,
    pub mean_ms: f64,
    /// Per-bucket (non-cumulative) counts keyed by upper bound
    pub buckets: Vec<(String, u64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub backend_failures: u64,
    pub slo_misses: u64,
    pub inference_ms: HistogramSnapshot,
    pub e2e_ms: HistogramSnapshot,
    pub gestures: BTreeMap<String, u64>,
}

/// Process-local metrics, read back by the CLI on exit
#[derive(Debug)]
pub struct InMemoryMetrics {
    requests: AtomicU64,
    errors: AtomicU64,
    backend_failures: AtomicU64,
    slo_misses: AtomicU64,
    inference_ms: Histogram,
    e2e_ms: Histogram,
    gestures: Mutex<HashMap<String, u64>>,
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            backend_failures: AtomicU64::new(0),
            slo_misses: AtomicU64::new(0),
            inference_ms: Histogram::new(&LATENCY_BUCKETS_MS),
            e2e_ms: Histogram::new(&LATENCY_BUCKETS_MS),
            gestures: Mutex::new(HashMap::new()),
        }
    }
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let gestures = self
            .gestures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(tag, count)| (tag.clone(), *count))
            .collect();

        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            backend_failures: self.backend_failures.load(Ordering::Relaxed),
            slo_misses: self.slo_misses.load(Ordering::Relaxed),
            inference_ms: self.inference_ms.snapshot(),
            e2e_ms: self.e2e_ms.snapshot(),
            gestures,
        }
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_backend_failure(&self) {
        self.backend_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_slo_miss(&self) {
        self.slo_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn observe_inference_ms(&self, ms: f64) {
        self.inference_ms.observe(ms);
    }

    fn observe_e2e_ms(&self, ms: f64) {
        self.e2e_ms.observe(ms);
    }

    fn record_gesture(&self, tag: &GestureTag) {
        *self
            .gestures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(tag.as_str().to_string())
            .or_insert(0) += 1;
    }
}
