//! Lock-free observability for a prefetch stage: samples emitted/dropped, queue high-water
//! mark, and a worker-busy ratio, readable without locking from any thread.

use dataloom_core::lockfree::AtomicCounter;

/// Shared, cache-line-aligned counters updated on the hot path by worker threads and read by
/// the consumer (or any external monitoring code) without locking.
#[derive(Default)]
pub struct PrefetchMetrics {
    samples_emitted: AtomicCounter,
    samples_dropped: AtomicCounter,
    queue_high_water: AtomicCounter,
    busy_workers: AtomicCounter,
    num_workers: AtomicCounter,
}

/// A point-in-time snapshot of [`PrefetchMetrics`], safe to hand to dashboards/backoff logic.
#[derive(Debug, Clone, Copy)]
pub struct PrefetchMetricsSnapshot {
    pub samples_emitted: u64,
    pub samples_dropped: u64,
    pub queue_high_water: u64,
    /// Fraction of workers that were mid-transform at the moment of the snapshot, in [0, 1].
    pub worker_busy_ratio: f64,
}

impl PrefetchMetrics {
    pub fn new(num_workers: u64) -> Self {
        let metrics = Self::default();
        metrics.num_workers.set(num_workers);
        metrics
    }

    pub fn record_emitted(&self) {
        self.samples_emitted.increment();
    }

    pub fn record_dropped(&self) {
        self.samples_dropped.increment();
    }

    pub fn record_queue_len(&self, len: usize) {
        let len = len as u64;
        if len > self.queue_high_water.get() {
            self.queue_high_water.set(len);
        }
    }

    /// Call around each per-sample transform invocation (not once per thread lifetime) so
    /// `worker_busy_ratio` reflects instantaneous load.
    pub fn sample_processing_started(&self) {
        self.busy_workers.increment();
    }

    pub fn sample_processing_finished(&self) {
        self.busy_workers.sub(1);
    }

    pub fn snapshot(&self) -> PrefetchMetricsSnapshot {
        let num_workers = self.num_workers.get().max(1);
        PrefetchMetricsSnapshot {
            samples_emitted: self.samples_emitted.get(),
            samples_dropped: self.samples_dropped.get(),
            queue_high_water: self.queue_high_water.get(),
            worker_busy_ratio: self.busy_workers.get() as f64 / num_workers as f64,
        }
    }
}
