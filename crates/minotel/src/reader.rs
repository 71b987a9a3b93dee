//! Periodic metric reader.
//!
//! Pull-based counterpart to the span processor: on each interval tick it
//! collects the current aggregated state from the meter provider into a
//! single-interval snapshot and exports it. The aggregation temporality tag
//! travels inside the snapshot, so the collector can tell increments from
//! running totals. Export failures are logged here and never reach the
//! instrument call paths.

use crate::exporter::{ExportError, MetricsExporterBoxed};
use crate::metrics::MeterProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

/// Default collection interval.
pub const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_secs(60);

enum Command {
    ForceFlush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Collects and exports metrics on a fixed interval.
pub struct PeriodicReader {
    cmd_tx: mpsc::Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl PeriodicReader {
    /// Creates the reader and spawns its worker task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        provider: MeterProvider,
        exporter: Arc<dyn MetricsExporterBoxed>,
        interval: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let worker = tokio::spawn(Self::run_worker(provider, exporter, cmd_rx, interval));

        Self {
            cmd_tx,
            worker: Mutex::new(Some(worker)),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Performs one out-of-band collect-and-export and waits for it.
    pub async fn force_flush(&self) -> Result<(), ExportError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ExportError::ShutdownInProgress);
        }

        let (done_tx, done_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ForceFlush(done_tx))
            .await
            .map_err(|_| ExportError::ShutdownInProgress)?;
        done_rx.await.map_err(|_| ExportError::ShutdownInProgress)
    }

    /// Performs a final collect-and-export, then shuts the exporter down.
    /// Idempotent.
    pub async fn shutdown(&self) -> Result<(), ExportError> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let (done_tx, done_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Shutdown(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }

        let worker = self.worker.lock().unwrap().take();
        if let Some(handle) = worker {
            handle
                .await
                .map_err(|e| ExportError::Transport(format!("worker join error: {e}")))?;
        }
        Ok(())
    }

    async fn run_worker(
        provider: MeterProvider,
        exporter: Arc<dyn MetricsExporterBoxed>,
        mut cmd_rx: mpsc::Receiver<Command>,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick is immediate and would export nothing useful
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    Self::collect_and_export(&provider, exporter.as_ref()).await;
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(Command::ForceFlush(done)) => {
                            Self::collect_and_export(&provider, exporter.as_ref()).await;
                            let _ = done.send(());
                        }
                        Some(Command::Shutdown(done)) => {
                            Self::collect_and_export(&provider, exporter.as_ref()).await;
                            exporter.shutdown_boxed().await;
                            let _ = done.send(());
                            break;
                        }
                        None => {
                            Self::collect_and_export(&provider, exporter.as_ref()).await;
                            exporter.shutdown_boxed().await;
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn collect_and_export(provider: &MeterProvider, exporter: &dyn MetricsExporterBoxed) {
        let snapshot = provider.collect();
        if snapshot.is_empty() {
            return;
        }
        if let Err(e) = exporter.export_boxed(snapshot).await {
            warn!(error = %e, "metrics export failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::MetricsExporter;
    use crate::metrics::{MetricData, NumberValue, ResourceMetrics, Temporality};
    use crate::resource::Resource;

    struct TestMetricsExporter {
        snapshots: Mutex<Vec<ResourceMetrics>>,
        shut_down: AtomicBool,
    }

    impl TestMetricsExporter {
        fn new() -> Self {
            Self {
                snapshots: Mutex::new(Vec::new()),
                shut_down: AtomicBool::new(false),
            }
        }

        fn export_count(&self) -> usize {
            self.snapshots.lock().unwrap().len()
        }

        fn last_snapshot(&self) -> Option<ResourceMetrics> {
            self.snapshots.lock().unwrap().last().cloned()
        }

        fn is_shut_down(&self) -> bool {
            self.shut_down.load(Ordering::Acquire)
        }
    }

    impl MetricsExporter for TestMetricsExporter {
        async fn export(&self, metrics: ResourceMetrics) -> Result<(), ExportError> {
            self.snapshots.lock().unwrap().push(metrics);
            Ok(())
        }

        async fn shutdown(&self) {
            self.shut_down.store(true, Ordering::Release);
        }

        fn name(&self) -> &str {
            "test"
        }
    }

    fn test_provider(temporality: Temporality) -> MeterProvider {
        MeterProvider::new(
            Arc::new(Resource::builder().with_service_name("test").build()),
            temporality,
        )
    }

    #[tokio::test]
    async fn test_interval_tick_exports_snapshot() {
        let provider = test_provider(Temporality::Cumulative);
        let exporter = Arc::new(TestMetricsExporter::new());
        let reader = PeriodicReader::new(
            provider.clone(),
            exporter.clone(),
            Duration::from_millis(100),
        );

        provider.meter("app").u64_counter("ticks").build().add(1, &[]);
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(exporter.export_count() >= 1);
        reader.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_force_flush_exports_out_of_band() {
        let provider = test_provider(Temporality::Cumulative);
        let exporter = Arc::new(TestMetricsExporter::new());
        let reader = PeriodicReader::new(
            provider.clone(),
            exporter.clone(),
            Duration::from_secs(3600),
        );

        provider.meter("app").u64_counter("events").build().add(3, &[]);
        reader.force_flush().await.unwrap();

        assert_eq!(exporter.export_count(), 1);
        let snapshot = exporter.last_snapshot().unwrap();
        let MetricData::Sum { points, .. } = &snapshot.scope_metrics[0].metrics[0].data else {
            panic!("expected sum");
        };
        assert_eq!(points[0].value, NumberValue::Int(3));
        reader.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_performs_final_export_and_is_idempotent() {
        let provider = test_provider(Temporality::Delta);
        let exporter = Arc::new(TestMetricsExporter::new());
        let reader = PeriodicReader::new(
            provider.clone(),
            exporter.clone(),
            Duration::from_secs(3600),
        );

        provider.meter("app").u64_counter("events").build().add(9, &[]);
        reader.shutdown().await.unwrap();

        assert_eq!(exporter.export_count(), 1);
        assert!(exporter.is_shut_down());

        reader.shutdown().await.unwrap();
        assert_eq!(exporter.export_count(), 1);

        assert_eq!(
            reader.force_flush().await,
            Err(ExportError::ShutdownInProgress)
        );
    }

    #[tokio::test]
    async fn test_empty_snapshot_is_not_exported() {
        let provider = test_provider(Temporality::Cumulative);
        let exporter = Arc::new(TestMetricsExporter::new());
        let reader = PeriodicReader::new(
            provider.clone(),
            exporter.clone(),
            Duration::from_secs(3600),
        );

        reader.force_flush().await.unwrap();
        assert_eq!(exporter.export_count(), 0);
        reader.shutdown().await.unwrap();
    }
}
