//! Async batch span processor.
//!
//! Bridges synchronous span-end calls with asynchronous export. Producers
//! hand sealed records to [`BatchSpanProcessor::on_end`], which only takes a
//! mutex and never blocks on I/O; a worker task owns the flush schedule.
//!
//! Flush triggers, whichever fires first:
//! - the queue reaches `max_export_batch_size` (the producer side notifies
//!   the worker, which exports exactly that batch while the queue keeps
//!   accepting new records),
//! - the scheduled delay elapses since the last flush,
//! - an explicit force-flush or shutdown call.
//!
//! Export failures are logged and counted at this boundary; they never reach
//! the code that created or ended the span.

use crate::batch::{BatchConfig, BatchMetrics, BatchQueue};
use crate::exporter::{ExportError, SpanExporterBoxed};
use crate::span::SpanRecord;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{trace, warn};

enum Command {
    ForceFlush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

struct Shared {
    queue: Mutex<BatchQueue>,
    batch_notify: Notify,
}

/// Buffers ended spans and exports them in batches from a worker task.
///
/// Two exports may legitimately be in flight at once (a new trigger can fire
/// before the previous HTTP call resolves); a batch that has been handed off
/// is never cancelled or rolled back.
pub struct BatchSpanProcessor {
    shared: Arc<Shared>,
    cmd_tx: mpsc::Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl BatchSpanProcessor {
    /// Creates the processor and spawns its worker task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(config: BatchConfig, exporter: Arc<dyn SpanExporterBoxed>) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(BatchQueue::new(config.clone())),
            batch_notify: Notify::new(),
        });

        let (cmd_tx, cmd_rx) = mpsc::channel(4);

        let worker = tokio::spawn(Self::run_worker(
            Arc::clone(&shared),
            exporter,
            cmd_rx,
            config,
        ));

        Self {
            shared,
            cmd_tx,
            worker: Mutex::new(Some(worker)),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Accepts a sealed span. Non-blocking for the producer: the record is
    /// queued (or shed under backpressure) and the worker is notified when a
    /// full batch is ready.
    pub fn on_end(&self, span: SpanRecord) {
        if self.shut_down.load(Ordering::Acquire) {
            trace!(span = %span.name, "span discarded after shutdown");
            return;
        }

        let batch_ready = {
            let mut queue = self.shared.queue.lock().unwrap();
            if let Some(shed) = queue.push(span) {
                trace!(span = %shed.name, "span shed under backpressure");
            }
            queue.should_flush()
        };

        if batch_ready {
            self.shared.batch_notify.notify_one();
        }
    }

    /// Exports everything currently buffered and waits for those exports to
    /// settle. Individual export failures are logged, not returned.
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

    /// Drains the queue, waits for in-flight exports, and shuts the exporter
    /// down. Idempotent: the second and later calls are no-ops.
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

    /// Current batching counters.
    pub fn metrics(&self) -> BatchMetrics {
        self.shared.queue.lock().unwrap().metrics().clone()
    }

    /// Number of records currently buffered.
    pub fn pending_spans(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    async fn run_worker(
        shared: Arc<Shared>,
        exporter: Arc<dyn SpanExporterBoxed>,
        mut cmd_rx: mpsc::Receiver<Command>,
        config: BatchConfig,
    ) {
        let mut interval = tokio::time::interval(config.scheduled_delay);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let export_semaphore = Arc::new(Semaphore::new(config.max_concurrent_exports));
        let mut export_tasks: JoinSet<(usize, Result<(), ExportError>)> = JoinSet::new();

        loop {
            tokio::select! {
                // Reap completed export tasks
                Some(result) = export_tasks.join_next(), if !export_tasks.is_empty() => {
                    Self::record_outcome(&shared, result);
                }

                // Size trigger: a full batch is ready
                _ = shared.batch_notify.notified() => {
                    loop {
                        let batch = {
                            let mut queue = shared.queue.lock().unwrap();
                            if !queue.should_flush() {
                                break;
                            }
                            queue.take_batch()
                        };
                        Self::spawn_export(
                            &exporter,
                            &export_semaphore,
                            &mut export_tasks,
                            batch,
                        )
                        .await;
                    }
                    interval.reset();
                }

                // Scheduled delay since the last flush
                _ = interval.tick() => {
                    loop {
                        let batch = shared.queue.lock().unwrap().take_batch();
                        if batch.is_empty() {
                            break;
                        }
                        Self::spawn_export(
                            &exporter,
                            &export_semaphore,
                            &mut export_tasks,
                            batch,
                        )
                        .await;
                    }
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(Command::ForceFlush(done)) => {
                            Self::drain_inline(&shared, exporter.as_ref()).await;
                            let _ = done.send(());
                            interval.reset();
                        }
                        Some(Command::Shutdown(done)) => {
                            Self::drain_inline(&shared, exporter.as_ref()).await;
                            while let Some(result) = export_tasks.join_next().await {
                                Self::record_outcome(&shared, result);
                            }
                            exporter.shutdown_boxed().await;
                            let _ = done.send(());
                            break;
                        }
                        // Processor dropped without shutdown: drain and exit
                        None => {
                            Self::drain_inline(&shared, exporter.as_ref()).await;
                            while let Some(result) = export_tasks.join_next().await {
                                Self::record_outcome(&shared, result);
                            }
                            exporter.shutdown_boxed().await;
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn spawn_export(
        exporter: &Arc<dyn SpanExporterBoxed>,
        semaphore: &Arc<Semaphore>,
        tasks: &mut JoinSet<(usize, Result<(), ExportError>)>,
        batch: Vec<SpanRecord>,
    ) {
        if batch.is_empty() {
            return;
        }
        let Ok(permit) = Arc::clone(semaphore).acquire_owned().await else {
            return;
        };
        let exporter = Arc::clone(exporter);
        let span_count = batch.len();

        tasks.spawn(async move {
            let result = exporter.export_boxed(batch).await;
            drop(permit);
            (span_count, result)
        });
    }

    /// Sequential drain used by force-flush and shutdown: exports the
    /// buffered set in batch-size chunks, awaiting each call.
    async fn drain_inline(shared: &Shared, exporter: &dyn SpanExporterBoxed) {
        loop {
            let batch = shared.queue.lock().unwrap().take_batch();
            if batch.is_empty() {
                break;
            }
            let span_count = batch.len() as u64;
            match exporter.export_boxed(batch).await {
                Ok(()) => {
                    shared
                        .queue
                        .lock()
                        .unwrap()
                        .metrics_mut()
                        .record_success(span_count);
                }
                Err(e) => {
                    warn!(error = %e, spans = span_count, "span export failed");
                    shared.queue.lock().unwrap().metrics_mut().record_error();
                }
            }
        }
    }

    fn record_outcome(
        shared: &Shared,
        result: Result<(usize, Result<(), ExportError>), tokio::task::JoinError>,
    ) {
        match result {
            Ok((span_count, Ok(()))) => {
                shared
                    .queue
                    .lock()
                    .unwrap()
                    .metrics_mut()
                    .record_success(span_count as u64);
            }
            Ok((span_count, Err(e))) => {
                warn!(error = %e, spans = span_count, "span export failed");
                shared.queue.lock().unwrap().metrics_mut().record_error();
            }
            Err(e) => {
                warn!(error = %e, "export task panicked");
                shared.queue.lock().unwrap().metrics_mut().record_error();
            }
        }
    }
}
