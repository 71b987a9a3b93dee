//! SDK wiring: configuration, the `init` registry, and lifecycle teardown.
//!
//! `init` hands back an explicit [`Telemetry`] handle rather than hiding
//! state in free functions; the one concession to global state is the
//! idempotence registry, kept behind this module's [`Registry`] object so a
//! second `init` returns the existing handle and a torn-down SDK can be
//! re-initialized cleanly.

use crate::delivery::DEFAULT_EXPORT_TIMEOUT;
use crate::exporters::{OtlpMetricsExporter, OtlpTraceExporter};
use minotel::attribute::KeyValue;
use minotel::batch::BatchConfig;
use minotel::context::StackContextManager;
use minotel::exporter::ExportError;
use minotel::metrics::{Meter, MeterProvider, Temporality};
use minotel::processor::BatchSpanProcessor;
use minotel::reader::{PeriodicReader, DEFAULT_EXPORT_INTERVAL};
use minotel::resource::Resource;
use minotel::sampler::{ParentBasedSampler, TraceIdRatioSampler};
use minotel::tracer::{Tracer, TracerProvider};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Default OTLP/HTTP endpoints.
pub const DEFAULT_TRACES_URL: &str = "http://localhost:4318/v1/traces";
pub const DEFAULT_METRICS_URL: &str = "http://localhost:4318/v1/metrics";

/// Errors raised while wiring the SDK.
#[derive(Debug, Error)]
pub enum InitError {
    /// A configured header name or value is not a valid HTTP header.
    #[error("invalid header: {name}")]
    InvalidHeader { name: String },
    /// The HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// SDK configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Logical service name (`service.name` resource attribute).
    pub service_name: String,
    /// Deployment environment (`deployment.environment`).
    pub environment: String,
    /// Release identifier (`service.version`), when known.
    pub release: Option<String>,
    /// Trace export endpoint.
    pub traces_url: String,
    /// Metrics export endpoint; metrics export is off when unset.
    pub metrics_url: Option<String>,
    /// Static headers sent with every export request. The content-type
    /// header is fixed and cannot be overridden here.
    pub headers: HashMap<String, String>,
    /// Fraction of root traces to record, in `[0.0, 1.0]`.
    pub sampling_ratio: f64,
    /// Extra resource attributes.
    pub resource_attributes: Vec<KeyValue>,
    /// Span batching configuration.
    pub batch: BatchConfig,
    /// Per-attempt delivery timeout.
    pub export_timeout: Duration,
    /// Metrics collection interval.
    pub metric_interval: Duration,
    /// Aggregation temporality for sums and histograms.
    pub metric_temporality: Temporality,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            environment: "dev".to_string(),
            release: None,
            traces_url: DEFAULT_TRACES_URL.to_string(),
            metrics_url: None,
            headers: HashMap::new(),
            sampling_ratio: 1.0,
            resource_attributes: Vec::new(),
            batch: BatchConfig::default(),
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
            metric_interval: DEFAULT_EXPORT_INTERVAL,
            metric_temporality: Temporality::default(),
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self
    }

    pub fn with_traces_url(mut self, url: impl Into<String>) -> Self {
        self.traces_url = url.into();
        self
    }

    pub fn with_metrics_url(mut self, url: impl Into<String>) -> Self {
        self.metrics_url = Some(url.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_sampling_ratio(mut self, ratio: f64) -> Self {
        self.sampling_ratio = ratio;
        self
    }

    pub fn with_resource_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<minotel::attribute::AttributeValue>,
    ) -> Self {
        self.resource_attributes.push(KeyValue::new(key, value));
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_export_timeout(mut self, timeout: Duration) -> Self {
        self.export_timeout = timeout;
        self
    }

    pub fn with_metric_interval(mut self, interval: Duration) -> Self {
        self.metric_interval = interval;
        self
    }

    pub fn with_metric_temporality(mut self, temporality: Temporality) -> Self {
        self.metric_temporality = temporality;
        self
    }

    fn build_resource(&self) -> Resource {
        let mut builder = Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_environment(self.environment.clone());
        if let Some(release) = &self.release {
            builder = builder.with_service_version(release.clone());
        }
        builder.with_attributes(self.resource_attributes.clone()).build()
    }
}

/// Init/teardown-lifecycle registry: makes `init` idempotent and lets
/// teardown restore the uninitialized state.
struct Registry {
    slot: Mutex<Option<Arc<Telemetry>>>,
}

impl Registry {
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<Telemetry>>> {
        self.slot.lock().unwrap()
    }

    /// Clears the slot if it still holds `telemetry`.
    fn clear(&self, telemetry: &Telemetry) {
        let mut slot = self.slot.lock().unwrap();
        if slot
            .as_ref()
            .is_some_and(|held| std::ptr::eq(held.as_ref(), telemetry))
        {
            *slot = None;
        }
    }
}

static REGISTRY: Registry = Registry {
    slot: Mutex::new(None),
};

/// The running SDK: providers, context manager, and teardown.
pub struct Telemetry {
    tracer_provider: TracerProvider,
    meter_provider: MeterProvider,
    reader: Option<PeriodicReader>,
    context_manager: StackContextManager,
    shut_down: AtomicBool,
}

/// Initializes the SDK and returns its handle.
///
/// Idempotent: while an instance is live, later calls return it untouched.
/// Must be called within a Tokio runtime (worker tasks are spawned here).
pub fn init(config: TelemetryConfig) -> Result<Arc<Telemetry>, InitError> {
    // The slot stays locked across the build, so concurrent inits cannot
    // both construct a pipeline
    let mut slot = REGISTRY.lock();
    if let Some(existing) = slot.as_ref() {
        return Ok(Arc::clone(existing));
    }

    let resource = Arc::new(config.build_resource());

    let context_manager = StackContextManager::new();
    context_manager.enable();

    let trace_exporter =
        OtlpTraceExporter::new(&config.traces_url, &config.headers, config.export_timeout)?;
    let processor = Arc::new(BatchSpanProcessor::new(
        config.batch.clone(),
        Arc::new(trace_exporter),
    ));
    let sampler = Box::new(ParentBasedSampler::new(TraceIdRatioSampler::new(
        config.sampling_ratio,
    )));
    let tracer_provider = TracerProvider::new(
        Arc::clone(&resource),
        sampler,
        processor,
        context_manager.clone(),
    );

    let meter_provider = MeterProvider::new(Arc::clone(&resource), config.metric_temporality);
    let reader = match &config.metrics_url {
        Some(url) => {
            let metrics_exporter =
                OtlpMetricsExporter::new(url, &config.headers, config.export_timeout)?;
            Some(PeriodicReader::new(
                meter_provider.clone(),
                Arc::new(metrics_exporter),
                config.metric_interval,
            ))
        }
        None => None,
    };

    let telemetry = Arc::new(Telemetry {
        tracer_provider,
        meter_provider,
        reader,
        context_manager,
        shut_down: AtomicBool::new(false),
    });
    *slot = Some(Arc::clone(&telemetry));
    drop(slot);

    info!(
        service = %config.service_name,
        traces_url = %config.traces_url,
        metrics = config.metrics_url.is_some(),
        "telemetry initialized"
    );
    Ok(telemetry)
}

impl Telemetry {
    /// Returns a tracer for the named instrumentation scope.
    pub fn tracer(&self, name: impl Into<String>) -> Tracer {
        self.tracer_provider.tracer(name)
    }

    /// Returns a meter for the named instrumentation scope.
    pub fn meter(&self, name: impl Into<String>) -> Meter {
        self.meter_provider.meter(name)
    }

    pub fn tracer_provider(&self) -> &TracerProvider {
        &self.tracer_provider
    }

    pub fn meter_provider(&self) -> &MeterProvider {
        &self.meter_provider
    }

    pub fn context_manager(&self) -> &StackContextManager {
        &self.context_manager
    }

    /// Exports everything currently buffered, traces and metrics both.
    pub async fn force_flush(&self) -> Result<(), ExportError> {
        self.tracer_provider.force_flush().await?;
        if let Some(reader) = &self.reader {
            reader.force_flush().await?;
        }
        Ok(())
    }

    /// Drains all batches and tears the pipelines down, in reverse order of
    /// installation (metrics reader, then the trace pipeline, then the
    /// context manager). Individual failures are logged and swallowed so one
    /// failing component never blocks the rest; this call itself never
    /// fails. Idempotent.
    ///
    /// Afterwards the registry slot is empty: a later [`init`] builds a
    /// fresh instance.
    pub async fn flush_and_shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(reader) = &self.reader {
            if let Err(e) = reader.shutdown().await {
                warn!(error = %e, "metrics reader shutdown failed");
            }
        }
        if let Err(e) = self.tracer_provider.shutdown().await {
            warn!(error = %e, "trace pipeline shutdown failed");
        }
        self.context_manager.disable();

        REGISTRY.clear(self);
        info!("telemetry shut down");
    }
}

/// Standalone provider teardown: attempts every step, then re-raises the
/// first failing step's error. Use [`Telemetry::flush_and_shutdown`] for the
/// swallowing variant.
pub async fn shutdown_providers(
    tracer_provider: &TracerProvider,
    reader: Option<&PeriodicReader>,
) -> Result<(), ExportError> {
    let mut first_error = None;

    if let Some(reader) = reader {
        if let Err(e) = reader.shutdown().await {
            first_error.get_or_insert(e);
        }
    }
    if let Err(e) = tracer_provider.shutdown().await {
        first_error.get_or_insert(e);
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
