//! Lightweight telemetry SDK: spans, metrics, context propagation, and
//! batched export.
//!
//! The crate is the transport-agnostic half of a telemetry pipeline:
//!
//! ```text
//! producers ──> Tracer/Meter ──> BatchSpanProcessor / PeriodicReader ──> SpanExporter /
//!                   │                                                    MetricsExporter
//!                   └── StackContextManager (active context, parenting)
//! ```
//!
//! Sealed [`span::SpanRecord`]s and collected [`metrics::ResourceMetrics`]
//! snapshots flow into exporter traits defined in [`exporter`]; a wire
//! encoding (such as OTLP/HTTP JSON) plugs in behind those traits. Sampling
//! happens at span start, batching is bounded and lossy under backpressure,
//! and shutdown drains everything exactly once.

pub mod attribute;
pub mod batch;
pub mod context;
pub mod exporter;
pub mod metrics;
pub mod processor;
pub mod propagation;
pub mod reader;
pub mod resource;
pub mod sampler;
pub mod span;
pub mod tracer;

// Re-export main types
pub use attribute::{AttributeValue, KeyValue};
pub use batch::{BatchConfig, BatchMetrics, BatchQueue, DropPolicy};
pub use context::{Context, ContextKey, StackContextManager};
pub use exporter::{
    ExportError, MetricsExporter, MetricsExporterBoxed, SpanExporter, SpanExporterBoxed,
};
pub use metrics::{
    F64Counter, F64Gauge, F64Histogram, Meter, MeterProvider, Metric, MetricData, NumberValue,
    ResourceMetrics, ScopeMetrics, Temporality, U64Counter,
};
pub use processor::BatchSpanProcessor;
pub use propagation::{format_traceparent, parse_traceparent, TRACEPARENT_HEADER};
pub use reader::PeriodicReader;
pub use resource::{Resource, ResourceBuilder};
pub use sampler::{
    AlwaysOffSampler, AlwaysOnSampler, ParentBasedSampler, Sampler, SamplingDecision,
    TraceIdRatioSampler,
};
pub use span::{
    InstrumentationScope, SpanContext, SpanEvent, SpanId, SpanKind, SpanLink, SpanRecord,
    SpanStatus, StatusCode, Timestamp, TraceId,
};
pub use tracer::{SpanBuilder, SpanHandle, Tracer, TracerProvider};
