//! The two OTLP/HTTP exporters, plugged in behind the core seam traits.

use crate::delivery::HttpDelivery;
use crate::sdk::InitError;
use crate::serialize;
use minotel::exporter::{ExportError, MetricsExporter, SpanExporter};
use minotel::metrics::ResourceMetrics;
use minotel::span::SpanRecord;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Exports sealed span batches as OTLP-JSON trace envelopes.
pub struct OtlpTraceExporter {
    delivery: HttpDelivery,
}

impl OtlpTraceExporter {
    pub fn new(
        url: impl Into<String>,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, InitError> {
        Ok(Self {
            delivery: HttpDelivery::new(url, headers, timeout)?,
        })
    }
}

impl SpanExporter for OtlpTraceExporter {
    async fn export(&self, batch: Vec<SpanRecord>) -> Result<(), ExportError> {
        if batch.is_empty() {
            return Ok(());
        }

        let envelope = serialize::encode_trace_request(&batch);
        let body = serialize::to_json(&envelope)?;
        self.delivery.send(body).await?;

        debug!(spans = batch.len(), url = %self.delivery.url(), "exported spans");
        Ok(())
    }

    async fn shutdown(&self) {
        self.delivery.shutdown();
    }

    fn name(&self) -> &str {
        "otlp-http-traces"
    }
}

/// Exports collected metric snapshots as OTLP-JSON metrics envelopes.
pub struct OtlpMetricsExporter {
    delivery: HttpDelivery,
}

impl OtlpMetricsExporter {
    pub fn new(
        url: impl Into<String>,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, InitError> {
        Ok(Self {
            delivery: HttpDelivery::new(url, headers, timeout)?,
        })
    }
}

impl MetricsExporter for OtlpMetricsExporter {
    async fn export(&self, metrics: ResourceMetrics) -> Result<(), ExportError> {
        if metrics.is_empty() {
            return Ok(());
        }

        let envelope = serialize::encode_metrics_request(&metrics);
        let body = serialize::to_json(&envelope)?;
        self.delivery.send(body).await?;

        debug!(url = %self.delivery.url(), "exported metrics");
        Ok(())
    }

    async fn shutdown(&self) {
        self.delivery.shutdown();
    }

    fn name(&self) -> &str {
        "otlp-http-metrics"
    }
}
