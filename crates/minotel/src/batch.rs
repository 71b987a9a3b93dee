//! Pure batching layer: a bounded FIFO of sealed spans.
//!
//! This module has no concurrency machinery: no `Arc`, no atomics, no
//! async. It owns exactly two decisions: what to drop when the queue is
//! full, and when the buffered set is large enough to flush. The async side
//! lives in [`crate::processor`], which wraps a `BatchQueue` in a mutex and
//! drives it from a worker task.

use crate::span::SpanRecord;
use std::collections::VecDeque;
use std::time::Duration;

/// What to evict when a record arrives on a full queue.
///
/// Backpressure here is deliberately lossy: telemetry is shed rather than
/// blocking span creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropPolicy {
    /// Evict the oldest buffered record; favors freshness.
    #[default]
    DropOldest,
    /// Reject the incoming record, keeping what is already buffered.
    DropNewest,
}

/// Configuration for span batching.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum number of buffered records before the drop policy applies.
    pub max_queue_size: usize,
    /// Batch size that triggers an immediate export, and the chunk size used
    /// when draining.
    pub max_export_batch_size: usize,
    /// Delay after which buffered records are exported even if the batch is
    /// not full, measured from the last flush.
    pub scheduled_delay: Duration,
    /// Eviction behavior on a full queue.
    pub drop_policy: DropPolicy,
    /// Maximum export calls in flight at once.
    pub max_concurrent_exports: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            max_export_batch_size: 256,
            scheduled_delay: Duration::from_secs(5),
            drop_policy: DropPolicy::default(),
            max_concurrent_exports: 2,
        }
    }
}

impl BatchConfig {
    /// Sets the maximum queue size.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size.max(1);
        self
    }

    /// Sets the export batch size.
    pub fn with_max_export_batch_size(mut self, size: usize) -> Self {
        self.max_export_batch_size = size.max(1);
        self
    }

    /// Sets the scheduled flush delay.
    pub fn with_scheduled_delay(mut self, delay: Duration) -> Self {
        self.scheduled_delay = delay;
        self
    }

    /// Sets the drop policy.
    pub fn with_drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Sets the maximum number of concurrent exports.
    pub fn with_max_concurrent_exports(mut self, max: usize) -> Self {
        self.max_concurrent_exports = max.max(1);
        self
    }
}

/// Batching counters (plain `u64`: single writer, no atomics).
#[derive(Debug, Default, Clone)]
pub struct BatchMetrics {
    /// Records accepted into the queue.
    pub spans_queued: u64,
    /// Records evicted under backpressure.
    pub spans_dropped: u64,
    /// Records successfully exported.
    pub spans_exported: u64,
    /// Batches successfully exported.
    pub batches_exported: u64,
    /// Failed export calls.
    pub export_errors: u64,
}

impl BatchMetrics {
    /// Records a successful export.
    pub fn record_success(&mut self, span_count: u64) {
        self.spans_exported += span_count;
        self.batches_exported += 1;
    }

    /// Records an export error.
    pub fn record_error(&mut self) {
        self.export_errors += 1;
    }
}

/// Bounded FIFO buffer of sealed spans.
///
/// Each record transitions buffered → exported exactly once: `take_batch`
/// removes records from the queue as it hands them out, so a record can
/// never appear in two batches, and records arriving after a hand-off start
/// the next batch.
pub struct BatchQueue {
    queue: VecDeque<SpanRecord>,
    config: BatchConfig,
    metrics: BatchMetrics,
}

impl BatchQueue {
    /// Creates an empty queue.
    pub fn new(config: BatchConfig) -> Self {
        Self {
            queue: VecDeque::with_capacity(config.max_export_batch_size.min(config.max_queue_size)),
            config,
            metrics: BatchMetrics::default(),
        }
    }

    /// Enqueues a record, applying the drop policy when full.
    ///
    /// Returns the record that was shed, if any, so the caller can log it.
    pub fn push(&mut self, record: SpanRecord) -> Option<SpanRecord> {
        if self.queue.len() < self.config.max_queue_size {
            self.queue.push_back(record);
            self.metrics.spans_queued += 1;
            return None;
        }

        self.metrics.spans_dropped += 1;
        match self.config.drop_policy {
            DropPolicy::DropOldest => {
                let evicted = self.queue.pop_front();
                self.queue.push_back(record);
                self.metrics.spans_queued += 1;
                evicted
            }
            DropPolicy::DropNewest => Some(record),
        }
    }

    /// Returns `true` once enough records are buffered for a full batch.
    pub fn should_flush(&self) -> bool {
        self.queue.len() >= self.config.max_export_batch_size
    }

    /// Removes and returns up to `max_export_batch_size` oldest records.
    ///
    /// Returns an empty vec when nothing is buffered.
    pub fn take_batch(&mut self) -> Vec<SpanRecord> {
        let n = self.queue.len().min(self.config.max_export_batch_size);
        self.queue.drain(..n).collect()
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns current metrics.
    pub fn metrics(&self) -> &BatchMetrics {
        &self.metrics
    }

    /// Returns mutable metrics (for recording export outcomes).
    pub fn metrics_mut(&mut self) -> &mut BatchMetrics {
        &mut self.metrics
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }
}
