//! OTLP/HTTP JSON exporter and SDK wiring for minotel.
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌─────────────────┐
//! │ minotel SDK  │────>│ OTLP-JSON encode  │────>│ OTLP collector  │
//! │ (spans/      │     │ + HTTP delivery   │     │ (POST /v1/...)  │
//! │  metrics)    │     │ (this crate)      │     │                 │
//! └──────────────┘     └───────────────────┘     └─────────────────┘
//! ```
//!
//! [`sdk::init`] wires the whole pipeline: resource, stack context manager,
//! parent-based ratio sampling, batch span processor with an
//! [`exporters::OtlpTraceExporter`], and (when a metrics endpoint is
//! configured) a periodic reader with an [`exporters::OtlpMetricsExporter`].
//! Serialization ([`serialize`]) is pure; delivery ([`delivery`]) is one
//! timeout-bounded POST per batch with no internal retries.
//!
//! # Usage
//!
//! ```rust,ignore
//! let telemetry = minotel_otlp::init(
//!     TelemetryConfig::new("checkout")
//!         .with_traces_url("http://collector:4318/v1/traces")
//!         .with_metrics_url("http://collector:4318/v1/metrics"),
//! )?;
//!
//! let tracer = telemetry.tracer("checkout.http");
//! let mut span = tracer.start_span("charge-card");
//! span.end();
//!
//! telemetry.flush_and_shutdown().await;
//! ```

pub mod delivery;
pub mod exporters;
pub mod sdk;
pub mod serialize;
pub mod wire;

// Re-export main types
pub use delivery::HttpDelivery;
pub use exporters::{OtlpMetricsExporter, OtlpTraceExporter};
pub use sdk::{
    init, shutdown_providers, InitError, Telemetry, TelemetryConfig, DEFAULT_METRICS_URL,
    DEFAULT_TRACES_URL,
};
