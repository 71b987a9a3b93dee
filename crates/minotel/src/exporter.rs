//! Export seam: error taxonomy and the exporter traits.
//!
//! Uses native async fn in traits. The `*Boxed` twins exist for dynamic
//! dispatch: `impl Future` return types are not object-safe, so the batch
//! processor and periodic reader hold `Arc<dyn …Boxed>` and the blanket
//! impls bridge any concrete exporter across.

use crate::metrics::ResourceMetrics;
use crate::span::SpanRecord;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Error types for export operations.
///
/// One attempt per batch: there is no retry variant on purpose. A failed
/// export surfaces here, gets logged at the export boundary, and the batch is
/// permanently lost.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExportError {
    /// Serialization failed. The encoder is total, so this indicates a
    /// defect; the export fails rather than guessing at a payload.
    #[error("encoding failed: {0}")]
    Encoding(String),
    /// The delivery attempt was aborted after the configured timeout.
    #[error("export timed out")]
    Timeout,
    /// The collector answered with a non-2xx status.
    #[error("collector rejected export (http {status})")]
    Rejected { status: u16 },
    /// Network-level failure (connect, DNS, broken transfer).
    #[error("transport error: {0}")]
    Transport(String),
    /// `send` was called after shutdown; no I/O was attempted.
    #[error("exporter is shut down")]
    ShutdownInProgress,
}

impl ExportError {
    /// Returns `true` if the delivery attempt hit its timeout bound.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if this error indicates the exporter is permanently
    /// unusable.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ShutdownInProgress)
    }
}

/// Trait for exporting sealed span batches to a backend.
pub trait SpanExporter: Send + Sync {
    /// Exports one batch. The batch was handed off atomically and is never
    /// retried or re-queued; it succeeds or fails as a unit.
    fn export(&self, batch: Vec<SpanRecord>) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Releases exporter resources; subsequent exports fail fast.
    fn shutdown(&self) -> impl Future<Output = ()> + Send;

    /// Returns the exporter name for diagnostics.
    fn name(&self) -> &str;
}

/// Object-safe version of [`SpanExporter`] for dynamic dispatch.
pub trait SpanExporterBoxed: Send + Sync {
    fn export_boxed(
        &self,
        batch: Vec<SpanRecord>,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>>;

    fn shutdown_boxed(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    fn name(&self) -> &str;
}

/// Blanket implementation: any [`SpanExporter`] can be used boxed.
impl<T: SpanExporter> SpanExporterBoxed for T {
    fn export_boxed(
        &self,
        batch: Vec<SpanRecord>,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>> {
        Box::pin(self.export(batch))
    }

    fn shutdown_boxed(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.shutdown())
    }

    fn name(&self) -> &str {
        SpanExporter::name(self)
    }
}

/// Trait for exporting a collected metrics snapshot.
pub trait MetricsExporter: Send + Sync {
    /// Exports one single-interval resource-metrics snapshot.
    fn export(
        &self,
        metrics: ResourceMetrics,
    ) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Releases exporter resources; subsequent exports fail fast.
    fn shutdown(&self) -> impl Future<Output = ()> + Send;

    /// Returns the exporter name for diagnostics.
    fn name(&self) -> &str;
}

/// Object-safe version of [`MetricsExporter`] for dynamic dispatch.
pub trait MetricsExporterBoxed: Send + Sync {
    fn export_boxed(
        &self,
        metrics: ResourceMetrics,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>>;

    fn shutdown_boxed(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    fn name(&self) -> &str;
}

impl<T: MetricsExporter> MetricsExporterBoxed for T {
    fn export_boxed(
        &self,
        metrics: ResourceMetrics,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>> {
        Box::pin(self.export(metrics))
    }

    fn shutdown_boxed(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.shutdown())
    }

    fn name(&self) -> &str {
        MetricsExporter::name(self)
    }
}

/// Test exporter that records all exported spans for verification.
#[cfg(test)]
pub(crate) struct TestSpanExporter {
    batches: std::sync::Mutex<Vec<Vec<SpanRecord>>>,
    shut_down: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl TestSpanExporter {
    pub(crate) fn new() -> Self {
        Self {
            batches: std::sync::Mutex::new(Vec::new()),
            shut_down: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub(crate) fn exported_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(Vec::len).sum()
    }

    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub(crate) fn all_spans(&self) -> Vec<SpanRecord> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(std::sync::atomic::Ordering::Acquire)
    }
}

#[cfg(test)]
impl SpanExporter for TestSpanExporter {
    async fn export(&self, batch: Vec<SpanRecord>) -> Result<(), ExportError> {
        self.batches.lock().unwrap().push(batch);
        Ok(())
    }

    async fn shutdown(&self) {
        self.shut_down
            .store(true, std::sync::atomic::Ordering::Release);
    }

    fn name(&self) -> &str {
        "test"
    }
}

/// Exporter that always fails, for error-path tests.
#[cfg(test)]
pub(crate) struct FailingSpanExporter;

#[cfg(test)]
impl SpanExporter for FailingSpanExporter {
    async fn export(&self, _batch: Vec<SpanRecord>) -> Result<(), ExportError> {
        Err(ExportError::Transport("simulated failure".into()))
    }

    async fn shutdown(&self) {}

    fn name(&self) -> &str {
        "failing"
    }
}
